//! Integration tests for the combining matcher and splitting transformer.
//!
//! These drive the public API end to end: module descriptors are registered through the
//! combining builder or the installer, and classes are defined through the in-memory host.

use std::sync::Arc;

use classweave::{
    installer::{CombiningPipeline, CombiningTransformerBuilder},
    matcher::DECORATOR_ANNOTATIONS,
    prelude::*,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pipeline(modules: &[ModuleDescriptor]) -> Result<CombiningPipeline> {
    init_logging();
    let mut builder = CombiningTransformerBuilder::new(Arc::new(ModuleIndex::build(modules)?));
    for module in modules {
        builder.register(module)?;
    }
    Ok(builder.build())
}

fn match_set(
    pipeline: &CombiningPipeline,
    class: &ClassDescriptor,
    loader: &LoaderRef,
) -> Vec<usize> {
    let mut set = MatchSet::new();
    pipeline
        .matcher()
        .match_class(&MatchContext::define(class, Some(loader)), &mut set);
    set.iter().map(ModuleId::index).collect()
}

fn loader(id: u64, class_name: &str, classes: &[&str]) -> LoaderRef {
    Arc::new(SimpleLoader::new(LoaderId(id), class_name).with_classes(classes.iter().copied()))
}

/// Module A selects `com.foo.Bar` by name, module B every subtype of `com.foo.Base` on
/// loaders exposing `com.foo.Marker`.
fn scenario_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("a", MatchStrategy::SingleType("com.foo.Bar".into()))
            .helper("com.foo.HelperA"),
        ModuleDescriptor::new(
            "b",
            MatchStrategy::Hierarchy {
                marker: Some("com.foo.Marker".into()),
                matcher: TypeMatcher::has_super_type("com.foo.Base"),
            },
        )
        .helper("com.foo.HelperB"),
    ]
}

fn bar() -> ClassDescriptor {
    ClassDescriptor::new("com.foo.Bar").extends("com.foo.Base")
}

#[test]
fn name_and_hinted_hierarchy_both_match() -> Result<()> {
    let modules = scenario_modules();
    let pipeline = pipeline(&modules)?;
    let app = loader(1, "AppClassLoader", &["com.foo.Marker"]);

    assert_eq!(match_set(&pipeline, &bar(), &app), vec![0, 1]);

    let runtime = Arc::new(InMemoryRuntime::new());
    let _handle = AgentInstaller::new(AgentConfig::default()).install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;
    runtime.define(bar(), Some(app.clone()))?;

    assert_eq!(
        runtime.edits("com.foo.Bar", Some(&app)),
        vec!["helpers[a] com.foo.HelperA", "helpers[b] com.foo.HelperB"]
    );
    Ok(())
}

#[test]
fn missing_marker_short_circuits_hierarchy() -> Result<()> {
    let pipeline = pipeline(&scenario_modules())?;
    let plain = loader(2, "AppClassLoader", &[]);

    assert_eq!(match_set(&pipeline, &bar(), &plain), vec![0]);
    Ok(())
}

#[test]
fn location_refinement_clears_initial_match() -> Result<()> {
    let mut modules = scenario_modules();
    modules[0] = modules[0]
        .clone()
        .loader(LoaderMatcher::loader_named("AppClassLoader"));
    let pipeline = pipeline(&modules)?;

    let other = loader(3, "com.acme.PluginLoader", &[]);
    assert!(match_set(&pipeline, &bar(), &other).is_empty());

    let app = loader(4, "AppClassLoader", &[]);
    assert_eq!(match_set(&pipeline, &bar(), &app), vec![0]);
    Ok(())
}

#[test]
fn matched_when_base_predicate_holds_and_no_refinement_rejects() -> Result<()> {
    let modules = vec![
        ModuleDescriptor::new("by-name", MatchStrategy::CallSite(TypeMatcher::named("x.A"))),
        ModuleDescriptor::new(
            "by-interface",
            MatchStrategy::Hierarchy {
                marker: None,
                matcher: TypeMatcher::ImplementsInterface("x.Handler".into()),
            },
        )
        .structure(TypeMatcher::IsInterface.not()),
        ModuleDescriptor::new(
            "by-annotation",
            MatchStrategy::CallSite(TypeMatcher::DeclaresAnnotation("x.Traced".into())),
        )
        .loader(LoaderMatcher::has_class_named("x.Runtime")),
        ModuleDescriptor::new(
            "configured",
            MatchStrategy::ConfiguredTypes(vec!["x.A".into(), "x.Z".into()]),
        ),
    ];
    let pipeline = pipeline(&modules)?;
    let app = loader(1, "AppClassLoader", &["x.Runtime"]);

    let class = ClassDescriptor::new("x.A")
        .implements("x.Handler")
        .annotated("x.Traced");
    assert_eq!(match_set(&pipeline, &class, &app), vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn any_rejecting_refinement_removes_the_module() -> Result<()> {
    let base = || MatchStrategy::CallSite(TypeMatcher::named("x.A"));
    let modules = vec![
        ModuleDescriptor::new("type-rejects", base()).structure(TypeMatcher::IsInterface),
        ModuleDescriptor::new("location-rejects", base())
            .loader(LoaderMatcher::loader_named("Nope")),
        ModuleDescriptor::new("second-rejects", base())
            .structure(TypeMatcher::Any)
            .loader(LoaderMatcher::Bootstrap),
        ModuleDescriptor::new("all-pass", base())
            .structure(TypeMatcher::Any)
            .loader(LoaderMatcher::Any),
    ];
    let pipeline = pipeline(&modules)?;
    let app = loader(1, "AppClassLoader", &[]);

    assert_eq!(match_set(&pipeline, &ClassDescriptor::new("x.A"), &app), vec![3]);
    Ok(())
}

#[test]
fn known_type_fast_path_agrees_with_slow_path() -> Result<()> {
    let names = vec!["java.sql.Driver".to_string(), "java.sql.Statement".to_string()];
    let fast = vec![
        ModuleDescriptor::new("known", MatchStrategy::KnownTypes(names.clone())),
        ModuleDescriptor::new(
            "shortcut",
            MatchStrategy::Shortcut {
                known: names.clone(),
                hierarchy: TypeMatcher::has_super_type("java.sql.Driver"),
                marker: None,
                only_known: false,
            },
        ),
    ];
    let slow = vec![
        ModuleDescriptor::new("known", MatchStrategy::ConfiguredTypes(names.clone())),
        ModuleDescriptor::new(
            "shortcut",
            MatchStrategy::CallSite(
                TypeMatcher::named_one_of(names.clone())
                    .or(TypeMatcher::has_super_type("java.sql.Driver")),
            ),
        ),
    ];
    let fast = pipeline(&fast)?;
    let slow = pipeline(&slow)?;
    assert!(!fast.matcher().known_mask().is_empty());
    assert!(slow.matcher().known_mask().is_empty());

    let app = loader(1, "AppClassLoader", &[]);
    for class in [
        ClassDescriptor::new("java.sql.Driver"),
        ClassDescriptor::new("java.sql.Statement"),
        ClassDescriptor::new("org.h2.Driver").implements("java.sql.Driver"),
        ClassDescriptor::new("java.lang.String"),
    ] {
        assert_eq!(
            match_set(&fast, &class, &app),
            match_set(&slow, &class, &app),
            "{}",
            class.name
        );
    }
    Ok(())
}

#[test]
fn failing_predicate_is_isolated() -> Result<()> {
    let modules = vec![
        ModuleDescriptor::new("good-before", MatchStrategy::CallSite(TypeMatcher::Any)),
        ModuleDescriptor::new(
            "broken",
            MatchStrategy::CallSite(TypeMatcher::custom("always fails", |class| {
                Err(Error::Predicate {
                    matcher: "always fails".into(),
                    message: format!("cannot resolve {}", class.name),
                })
            })),
        ),
        ModuleDescriptor::new(
            "broken-refinement",
            MatchStrategy::CallSite(TypeMatcher::Any),
        )
        .loader(LoaderMatcher::custom("always fails", |_| {
            Err(Error::Predicate {
                matcher: "always fails".into(),
                message: "loader unavailable".into(),
            })
        })),
        ModuleDescriptor::new("good-after", MatchStrategy::SingleType("x.A".into())),
    ];
    let pipeline = pipeline(&modules)?;
    let app = loader(1, "AppClassLoader", &[]);

    // a failing refinement leaves the bit as the base predicate set it
    assert_eq!(
        match_set(&pipeline, &ClassDescriptor::new("x.A"), &app),
        vec![0, 2, 3]
    );
    Ok(())
}

#[test]
fn panicking_predicate_leaves_other_modules_transformed() -> Result<()> {
    init_logging();
    let modules = vec![
        ModuleDescriptor::new("good", MatchStrategy::SingleType("com.foo.Bar".into()))
            .helper("x.Good"),
        ModuleDescriptor::new(
            "bad",
            MatchStrategy::CallSite(TypeMatcher::custom("explodes", |_| {
                panic!("predicate exploded")
            })),
        )
        .helper("x.Bad"),
        ModuleDescriptor::new("bad-loader", MatchStrategy::CallSite(TypeMatcher::Any))
            .loader(LoaderMatcher::custom("explodes", |_| panic!("loader exploded")))
            .helper("x.BadLoader"),
    ];

    for strategy in [InstallStrategy::Combining, InstallStrategy::Legacy] {
        let runtime = Arc::new(InMemoryRuntime::new());
        let _handle = AgentInstaller::new(AgentConfig::default().with_strategy(strategy))
            .install(
                runtime.clone(),
                runtime.clone(),
                Arc::new(ModuleIndex::build(&modules)?),
                &modules,
            )?;
        let app = loader(1, "AppClassLoader", &[]);

        runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(app.clone()))?;
        // the panicking refinement leaves the bit its base predicate set
        assert_eq!(
            runtime.edits("com.foo.Bar", Some(&app)),
            vec!["helpers[good] x.Good", "helpers[bad-loader] x.BadLoader"],
            "{strategy:?}"
        );
    }
    Ok(())
}

#[test]
fn decorators_are_never_transformed() -> Result<()> {
    let pipeline = pipeline(&[ModuleDescriptor::new(
        "all",
        MatchStrategy::CallSite(TypeMatcher::Any),
    )])?;
    let app = loader(1, "AppClassLoader", &[]);

    for annotation in DECORATOR_ANNOTATIONS {
        let class = ClassDescriptor::new("x.Decorated").annotated(annotation);
        assert!(match_set(&pipeline, &class, &app).is_empty());
    }
    Ok(())
}

#[test]
fn context_store_injector_runs_after_modules() -> Result<()> {
    let modules = vec![ModuleDescriptor::new(
        "servlet",
        MatchStrategy::Hierarchy {
            marker: Some("javax.servlet.Servlet".into()),
            matcher: TypeMatcher::has_super_type("javax.servlet.Servlet"),
        },
    )
    .context_store("javax.servlet.Servlet", "com.acme.Span")];

    let runtime = Arc::new(InMemoryRuntime::new());
    let handle = AgentInstaller::new(AgentConfig::default()).install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;
    assert_eq!(handle.modules().len(), 2);

    let app = loader(1, "AppClassLoader", &["javax.servlet.Servlet"]);
    let class = ClassDescriptor::new("com.acme.Home").extends("javax.servlet.Servlet");
    runtime.define(class, Some(app.clone()))?;

    assert_eq!(
        runtime.edits("com.acme.Home", Some(&app)),
        vec![
            "context-rewrite[servlet] javax.servlet.Servlet->com.acme.Span",
            "context-field javax.servlet.Servlet->com.acme.Span",
        ]
    );

    // the key type is an interface; only implementations receive the field
    let api = ClassDescriptor::new("javax.servlet.Servlet").interface();
    runtime.define(api, Some(app.clone()))?;
    assert!(runtime
        .edits("javax.servlet.Servlet", Some(&app))
        .iter()
        .all(|edit| !edit.starts_with("context-field")));
    Ok(())
}

#[test]
fn muzzle_rejection_is_reported() -> Result<()> {
    let modules = vec![ModuleDescriptor::new(
        "okhttp",
        MatchStrategy::SingleType("okhttp3.OkHttpClient".into()),
    )
    .helper("x.Helper")
    .muzzle_references(["okhttp3.Interceptor"])];

    let runtime = Arc::new(InMemoryRuntime::new());
    let handle = AgentInstaller::new(AgentConfig::default()).install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;

    let old = loader(1, "AppClassLoader", &[]);
    runtime.define(ClassDescriptor::new("okhttp3.OkHttpClient"), Some(old.clone()))?;
    assert!(runtime.edits("okhttp3.OkHttpClient", Some(&old)).is_empty());

    let status = handle.status().get(ModuleId::new(0)).unwrap_or_default();
    assert_eq!(status.muzzled, 1);
    assert_eq!(status.applied, 0);

    let new = loader(2, "AppClassLoader", &["okhttp3.Interceptor"]);
    runtime.define(ClassDescriptor::new("okhttp3.OkHttpClient"), Some(new.clone()))?;
    assert_eq!(
        runtime.edits("okhttp3.OkHttpClient", Some(&new)),
        vec!["helpers[okhttp] x.Helper"]
    );
    Ok(())
}
