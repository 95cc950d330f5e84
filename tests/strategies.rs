//! Integration tests for the deployment strategies and transform ordering.
//!
//! The legacy strategy installs one transformer per module; the combining strategy a single
//! one. Both must leave every class with identical bytes.

use std::sync::Arc;

use classweave::{prelude::*, transform::ClassEdit};

fn modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("jdbc", MatchStrategy::SingleType("java.sql.Driver".into()))
            .helper("com.acme.JdbcHelper")
            .advice(MethodMatcher::named("connect"), "com.acme.ConnectAdvice"),
        ModuleDescriptor::new(
            "servlet",
            MatchStrategy::Hierarchy {
                marker: Some("javax.servlet.Servlet".into()),
                matcher: TypeMatcher::has_super_type("javax.servlet.Servlet"),
            },
        )
        .structure(TypeMatcher::IsInterface.not())
        .context_store("javax.servlet.Servlet", "com.acme.Span")
        .advice(MethodMatcher::named("service"), "com.acme.ServiceAdvice"),
        ModuleDescriptor::new(
            "annotated",
            MatchStrategy::CallSite(TypeMatcher::DeclaresAnnotation("com.acme.Traced".into())),
        )
        .loader(LoaderMatcher::loader_named("AppClassLoader"))
        .transform(CustomTransform::new("tag", |builder, class, _| {
            builder.push(ClassEdit::Custom {
                module: "annotated".into(),
                detail: format!("traced {}", class.name),
            });
            Ok(())
        })),
        ModuleDescriptor::new(
            "executor",
            MatchStrategy::KnownTypes(vec![
                "java.util.concurrent.ThreadPoolExecutor".into(),
                "java.sql.Driver".into(),
            ]),
        )
        .flags(ModuleFlags::FOR_BOOTSTRAP)
        .context_store("java.lang.Runnable", "com.acme.State")
        .muzzle_references(["java.util.concurrent.Executor"]),
    ]
}

fn classes() -> Vec<ClassDescriptor> {
    vec![
        ClassDescriptor::new("java.sql.Driver")
            .method(MethodDescriptor::new("connect", "(Ljava/lang/String;)V"))
            .method(MethodDescriptor::synthetic("connect", "()V")),
        ClassDescriptor::new("com.acme.Home")
            .extends("javax.servlet.Servlet")
            .annotated("com.acme.Traced")
            .method(MethodDescriptor::new("service", "()V")),
        ClassDescriptor::new("javax.servlet.Servlet").interface(),
        ClassDescriptor::new("java.util.concurrent.ThreadPoolExecutor"),
        ClassDescriptor::new("com.acme.Task").implements("java.lang.Runnable"),
        ClassDescriptor::new("com.acme.Unrelated"),
    ]
}

fn loaders() -> Vec<Option<LoaderRef>> {
    let app: LoaderRef = Arc::new(
        SimpleLoader::new(LoaderId(1), "AppClassLoader")
            .with_classes(["javax.servlet.Servlet", "java.util.concurrent.Executor"]),
    );
    let plugin: LoaderRef = Arc::new(SimpleLoader::new(LoaderId(2), "PluginLoader"));
    vec![None, Some(app), Some(plugin)]
}

fn run(strategy: InstallStrategy) -> Result<Vec<(String, Option<u64>, Vec<u8>)>> {
    let modules = modules();
    let runtime = Arc::new(InMemoryRuntime::new());
    let _handle = AgentInstaller::new(AgentConfig::default().with_strategy(strategy)).install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;

    let mut outcomes = Vec::new();
    for loader in loaders() {
        for class in classes() {
            let name = class.name.clone();
            let bytes = runtime.define(class, loader.clone())?;
            outcomes.push((name, loader.as_ref().map(|l| l.id().0), bytes));
        }
    }
    Ok(outcomes)
}

#[test]
fn legacy_and_combining_produce_identical_classes() -> Result<()> {
    let combining = run(InstallStrategy::Combining)?;
    let legacy = run(InstallStrategy::Legacy)?;

    assert_eq!(combining.len(), legacy.len());
    for (lhs, rhs) in combining.iter().zip(&legacy) {
        assert_eq!(lhs, rhs, "{} on loader {:?}", lhs.0, lhs.1);
    }

    // the comparison is only meaningful if something was transformed
    let transformed = combining
        .iter()
        .filter(|(name, _, bytes)| *bytes != classweave::host::memory::original_bytes(name))
        .count();
    assert!(transformed >= 5, "only {transformed} classes transformed");
    Ok(())
}

#[test]
fn stacks_apply_in_ascending_id_order() -> Result<()> {
    let modules = modules();
    let runtime = Arc::new(InMemoryRuntime::new());
    let _handle = AgentInstaller::default().install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;

    let app = loaders().remove(1);
    let home = classes().remove(1);
    for _ in 0..2 {
        runtime.define(home.clone(), app.clone())?;
        assert_eq!(
            runtime.edits("com.acme.Home", app.as_ref()),
            vec![
                "context-rewrite[servlet] javax.servlet.Servlet->com.acme.Span",
                "advice[servlet] service()V com.acme.ServiceAdvice",
                "custom[annotated] traced com.acme.Home",
                "context-field javax.servlet.Servlet->com.acme.Span",
            ]
        );
    }

    runtime.define(classes().remove(0), app.clone())?;
    assert_eq!(
        runtime.edits("java.sql.Driver", app.as_ref()),
        vec![
            "helpers[jdbc] com.acme.JdbcHelper",
            "advice[jdbc] connect(Ljava/lang/String;)V com.acme.ConnectAdvice",
            "context-rewrite[executor] java.lang.Runnable->com.acme.State",
        ]
    );
    Ok(())
}

#[test]
fn failing_stack_rolls_back_only_its_module() -> Result<()> {
    for strategy in [InstallStrategy::Combining, InstallStrategy::Legacy] {
        let modules = vec![
            ModuleDescriptor::new("first", MatchStrategy::SingleType("x.A".into()))
                .helper("x.First"),
            ModuleDescriptor::new("broken", MatchStrategy::SingleType("x.A".into()))
                .helper("x.Partial")
                .transform(CustomTransform::new("fail", |_, class, _| {
                    Err(Error::Transform {
                        module: ModuleId::new(1),
                        message: format!("cannot rewrite {}", class.name),
                    })
                })),
            ModuleDescriptor::new("last", MatchStrategy::SingleType("x.A".into()))
                .helper("x.Last"),
        ];
        let runtime = Arc::new(InMemoryRuntime::new());
        let handle = AgentInstaller::new(AgentConfig::default().with_strategy(strategy)).install(
            runtime.clone(),
            runtime.clone(),
            Arc::new(ModuleIndex::build(&modules)?),
            &modules,
        )?;

        runtime.define(ClassDescriptor::new("x.A"), None)?;
        assert_eq!(
            runtime.edits("x.A", None),
            vec!["helpers[first] x.First", "helpers[last] x.Last"],
            "{strategy:?}"
        );

        let broken = handle.status().get(ModuleId::new(1)).unwrap_or_default();
        assert_eq!(broken.failed, 1);
        assert_eq!(broken.applied, 0);
        assert!(broken
            .last_failure
            .is_some_and(|message| message.contains("cannot rewrite x.A")));
        assert_eq!(
            handle.status().get(ModuleId::new(2)).map(|s| s.applied),
            Some(1)
        );
    }
    Ok(())
}
