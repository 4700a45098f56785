use crate::{
    application::{context::Registries, contributor::Contributor},
    config::EmojiScriptSettings,
};

/// Precaches the emoji-detection script when the deployment ships one.
pub struct EmojiDetectionContributor {
    script: EmojiScriptSettings,
}

impl EmojiDetectionContributor {
    pub fn new(script: EmojiScriptSettings) -> Self {
        Self { script }
    }
}

impl Contributor for EmojiDetectionContributor {
    fn name(&self) -> &str {
        "emoji-detection"
    }

    fn serve(&self, registries: &mut Registries) {
        if self.script.enabled {
            registries.register_precached_route(&self.script.url, self.script.revision.clone());
        }
    }
}
