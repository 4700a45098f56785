//! Dependency resolution and rendering of script modules into a single bundle.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    panic::{self, AssertUnwindSafe},
};

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::application::modules::{
    ContentSource, ModuleRegistry, RenderView, ScriptFileLoader, ScriptModule,
};

pub(crate) const METRIC_MODULE_DEGRADED: &str = "swbundle_module_degraded_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("module `{handle}` is not registered{}", required_by_suffix(.required_by))]
    UnknownHandle {
        handle: String,
        required_by: Option<String>,
    },
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(dependent) => format!(" (required by `{dependent}`)"),
        None => String::new(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order the dependency closure of `targets` so every dependency precedes its dependents.
///
/// Handles without an ordering constraint between them keep registration order.
pub fn resolve<S: AsRef<str>>(
    modules: &ModuleRegistry,
    targets: &[S],
) -> Result<Vec<String>, CompileError> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();

    for target in targets {
        let target = target.as_ref();
        let Some(module) = modules.get(target) else {
            return Err(CompileError::UnknownHandle {
                handle: target.to_string(),
                required_by: None,
            });
        };
        visit(modules, module, &mut marks, &mut path)?;
    }

    let mut pending: HashMap<&str, usize> = HashMap::with_capacity(marks.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for &handle in marks.keys() {
        let Some(module) = modules.get(handle) else {
            continue;
        };
        pending.insert(handle, module.deps.len());
        for dep in &module.deps {
            dependents.entry(dep.as_str()).or_default().push(handle);
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .filter_map(|(&handle, _)| modules.position(handle).map(|p| Reverse((p, handle))))
        .collect();

    let mut order = Vec::with_capacity(pending.len());
    while let Some(Reverse((_, handle))) = ready.pop() {
        order.push(handle.to_string());
        for &dependent in dependents.get(handle).into_iter().flatten() {
            let Some(count) = pending.get_mut(dependent) else {
                continue;
            };
            *count -= 1;
            if *count == 0
                && let Some(position) = modules.position(dependent)
            {
                ready.push(Reverse((position, dependent)));
            }
        }
    }

    Ok(order)
}

fn visit<'a>(
    modules: &'a ModuleRegistry,
    module: &'a ScriptModule,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Result<(), CompileError> {
    let handle = module.handle.as_str();
    match marks.get(handle) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|h| *h == handle).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|h| h.to_string()).collect();
            cycle.push(handle.to_string());
            return Err(CompileError::Cycle { cycle });
        }
        None => {}
    }

    marks.insert(handle, Mark::Visiting);
    path.push(handle);
    for dep in &module.deps {
        let Some(dependency) = modules.get(dep) else {
            return Err(CompileError::UnknownHandle {
                handle: dep.clone(),
                required_by: Some(handle.to_string()),
            });
        };
        visit(modules, dependency, marks, path)?;
    }
    path.pop();
    marks.insert(handle, Mark::Done);
    Ok(())
}

/// Rendered bundle text plus the handles that degraded to placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBundle {
    pub text: String,
    pub degraded: Vec<String>,
}

/// Render `order` into bundle text.
///
/// A module whose content cannot be produced is replaced by a warning statement;
/// the rest of the bundle still renders.
pub fn render<S: AsRef<str>>(
    modules: &ModuleRegistry,
    order: &[S],
    view: &RenderView<'_>,
    files: &dyn ScriptFileLoader,
) -> Result<RenderedBundle, CompileError> {
    let mut fragments = Vec::with_capacity(order.len() + 2);
    fragments.push(format!(
        "/* Service worker for the {} scope. */",
        view.scope.as_str()
    ));
    fragments.push(format!(
        "/* Assembled by swbundle {} from {} modules. */",
        env!("CARGO_PKG_VERSION"),
        order.len()
    ));

    let mut degraded = Vec::new();
    for handle in order {
        let handle = handle.as_ref();
        let module = modules
            .get(handle)
            .ok_or_else(|| CompileError::UnknownHandle {
                handle: handle.to_string(),
                required_by: None,
            })?;

        let fragment = match &module.source {
            ContentSource::Static(text) => {
                format!("/* Source {}: */\n{text}", comment_safe(handle))
            }
            ContentSource::File(reference) => match files.load(reference) {
                Ok(script) => format!(
                    "/* Source {} <{}>: */\n{}",
                    comment_safe(handle),
                    comment_safe(reference),
                    script.contents
                ),
                Err(err) => {
                    degraded.push(handle.to_string());
                    placeholder(handle, &error_chain(&err))
                }
            },
            ContentSource::Callback(callback) => {
                match panic::catch_unwind(AssertUnwindSafe(|| callback(view))) {
                    Ok(Ok(text)) => format!("/* Source {}: */\n{text}", comment_safe(handle)),
                    Ok(Err(err)) => {
                        degraded.push(handle.to_string());
                        placeholder(handle, &err.to_string())
                    }
                    Err(_) => {
                        degraded.push(handle.to_string());
                        placeholder(handle, "callback panicked")
                    }
                }
            }
        };
        fragments.push(fragment);
    }

    Ok(RenderedBundle {
        text: fragments.join("\n"),
        degraded,
    })
}

fn placeholder(handle: &str, reason: &str) -> String {
    warn!(
        target = "swbundle::compiler",
        handle = handle,
        reason = reason,
        "module degraded to a placeholder",
    );
    counter!(METRIC_MODULE_DEGRADED).increment(1);

    let message = Value::String(format!(
        "swbundle: module `{handle}` could not be rendered: {reason}"
    ));
    format!(
        "/* Source {}: unavailable ({}) */\nconsole.warn({message});",
        comment_safe(handle),
        comment_safe(reason)
    )
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(inner) = current {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        current = inner.source();
    }
    message
}

fn comment_safe(text: &str) -> String {
    text.replace("*/", "*\\/")
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::{
        application::{
            modules::{CallbackError, FileLoadError, LoadedScript},
            precaching::PrecachingRoutes,
            routes::CachingRoutes,
        },
        config::WorkerSettings,
        domain::scope::Scope,
    };

    struct NoFiles;

    impl ScriptFileLoader for NoFiles {
        fn load(&self, reference: &str) -> Result<LoadedScript, FileLoadError> {
            if reference == "/static/ok.js" {
                return Ok(LoadedScript {
                    location: reference.into(),
                    contents: "ok();".to_string(),
                });
            }
            Err(FileLoadError::OutsideAllowedRoots {
                path: reference.to_string(),
            })
        }
    }

    fn chain() -> ModuleRegistry {
        let mut modules = ModuleRegistry::new();
        modules.register_module("C", ContentSource::text("c();"), &["B"]);
        modules.register_module("B", ContentSource::text("b();"), &["A"]);
        modules.register_module("A", ContentSource::text("a();"), &[]);
        modules
    }

    fn render_with(modules: &ModuleRegistry, order: &[String]) -> RenderedBundle {
        let site = Url::parse("https://example.org/").unwrap();
        let caching = CachingRoutes::new();
        let precaching = PrecachingRoutes::new(site.clone());
        let worker = WorkerSettings::for_site(site);
        let view = RenderView {
            scope: Scope::Front,
            caching: &caching,
            precaching: &precaching,
            worker: &worker,
        };
        render(modules, order, &view, &NoFiles).expect("render")
    }

    #[test]
    fn dependencies_precede_dependents_in_any_registration_order() {
        let modules = chain();
        assert_eq!(resolve(&modules, &["C"]).unwrap(), vec!["A", "B", "C"]);

        let mut reversed = ModuleRegistry::new();
        reversed.register_module("A", ContentSource::text(""), &[]);
        reversed.register_module("B", ContentSource::text(""), &["A"]);
        reversed.register_module("C", ContentSource::text(""), &["B"]);
        assert_eq!(resolve(&reversed, &["C"]).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn resolve_is_idempotent() {
        let modules = chain();
        let first = resolve(&modules, &["C", "A"]).unwrap();
        let second = resolve(&modules, &["C", "A"]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unconstrained_handles_keep_registration_order() {
        let mut modules = ModuleRegistry::new();
        modules.register_module("late-dep", ContentSource::text(""), &[]);
        modules.register_module("x", ContentSource::text(""), &[]);
        modules.register_module("y", ContentSource::text(""), &["z"]);
        modules.register_module("z", ContentSource::text(""), &[]);

        let all: Vec<String> = modules.handles().map(str::to_string).collect();
        assert_eq!(
            resolve(&modules, &all).unwrap(),
            vec!["late-dep", "x", "z", "y"]
        );
    }

    #[test]
    fn closure_excludes_unrequested_modules() {
        let mut modules = chain();
        modules.register_module("D", ContentSource::text(""), &[]);
        assert_eq!(resolve(&modules, &["B"]).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn unknown_handles_fail_compilation() {
        let modules = chain();
        assert_eq!(
            resolve(&modules, &["nope"]).unwrap_err(),
            CompileError::UnknownHandle {
                handle: "nope".to_string(),
                required_by: None
            }
        );

        let mut broken = chain();
        broken.register_module("E", ContentSource::text(""), &["ghost"]);
        let err = resolve(&broken, &["E"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "module `ghost` is not registered (required by `E`)"
        );
    }

    #[test]
    fn cycles_are_reported_by_name() {
        let mut modules = ModuleRegistry::new();
        modules.register_module("a", ContentSource::text(""), &["b"]);
        modules.register_module("b", ContentSource::text(""), &["c"]);
        modules.register_module("c", ContentSource::text(""), &["a"]);
        let err = resolve(&modules, &["a"]).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");

        let mut selfish = ModuleRegistry::new();
        selfish.register_module("s", ContentSource::text(""), &["s"]);
        assert_eq!(
            resolve(&selfish, &["s"]).unwrap_err(),
            CompileError::Cycle {
                cycle: vec!["s".to_string(), "s".to_string()]
            }
        );
    }

    #[test]
    fn failed_module_degrades_without_aborting() {
        let mut modules = ModuleRegistry::new();
        modules.register_module("A", ContentSource::text("a();"), &[]);
        modules.register_module("B", ContentSource::file("/etc/passwd"), &["A"]);
        modules.register_module("C", ContentSource::text("c();"), &["B"]);

        let order = resolve(&modules, &["C"]).unwrap();
        let bundle = render_with(&modules, &order);

        assert!(bundle.text.contains("/* Source A: */\na();"));
        assert!(bundle.text.contains("/* Source C: */\nc();"));
        assert!(bundle.text.contains("console.warn("));
        assert_eq!(bundle.degraded, vec!["B"]);
        let a = bundle.text.find("a();").unwrap();
        let c = bundle.text.find("c();").unwrap();
        assert!(a < c);
    }

    #[test]
    fn panicking_callback_degrades_without_aborting() {
        let mut modules = ModuleRegistry::new();
        modules.register_module("A", ContentSource::text("a();"), &[]);
        modules.register_module(
            "B",
            ContentSource::callback(|_| {
                let empty: Vec<u8> = Vec::new();
                Ok(format!("// {}", empty[3]))
            }),
            &["A"],
        );
        modules.register_module("C", ContentSource::text("c();"), &["B"]);

        let order = resolve(&modules, &["C"]).unwrap();
        let bundle = render_with(&modules, &order);

        assert!(bundle.text.contains("/* Source A: */\na();"));
        assert!(bundle.text.contains("/* Source B: unavailable (callback panicked) */"));
        assert!(bundle.text.contains("/* Source C: */\nc();"));
        assert_eq!(bundle.degraded, vec!["B"]);
    }

    #[test]
    fn banner_and_file_headers() {
        let mut modules = ModuleRegistry::new();
        modules.register_module("app", ContentSource::file("/static/ok.js"), &[]);
        modules.register_module(
            "cb",
            ContentSource::callback(|view| Ok(format!("// {}", view.scope))),
            &[],
        );
        modules.register_module(
            "broken",
            ContentSource::callback(|_| Err(CallbackError::new("no data */ here"))),
            &[],
        );

        let order: Vec<String> = modules.handles().map(str::to_string).collect();
        let bundle = render_with(&modules, &order);
        let lines: Vec<&str> = bundle.text.lines().collect();

        assert_eq!(lines[0], "/* Service worker for the front scope. */");
        assert!(lines[1].starts_with("/* Assembled by swbundle "));
        assert!(lines[1].ends_with(" from 3 modules. */"));
        assert_eq!(lines[2], "/* Source app </static/ok.js>: */");
        assert_eq!(lines[3], "ok();");
        assert_eq!(lines[5], "// front");
        assert_eq!(
            lines[6],
            "/* Source broken: unavailable (no data *\\/ here) */"
        );
    }
}
