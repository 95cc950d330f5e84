//! Integration tests for deferred matching.
//!
//! Deferral delays are above five seconds, so most of these tests end deferral through
//! `AgentHandle::resume_deferred_matching`. One test waits for the timer thread.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use classweave::{
    config::{DEFER_CLASSLOADERS, DEFER_UNTIL},
    installer::CombiningTransformerBuilder,
    matcher::DeferredMatching,
    prelude::*,
};

const DEFERRED_LOADER: &str = "some.AppLoader";

fn modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("a", MatchStrategy::SingleType("com.foo.Bar".into()))
            .helper("com.foo.HelperA"),
        ModuleDescriptor::new("all", MatchStrategy::CallSite(TypeMatcher::Any))
            .structure(TypeMatcher::NameStartsWith("com.foo.".into()))
            .helper("com.foo.HelperAll"),
    ]
}

fn install(config: AgentConfig) -> Result<(Arc<InMemoryRuntime>, AgentHandle)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let modules = modules();
    let runtime = Arc::new(InMemoryRuntime::new());
    let handle = AgentInstaller::new(config).install(
        runtime.clone(),
        runtime.clone(),
        Arc::new(ModuleIndex::build(&modules)?),
        &modules,
    )?;
    Ok((runtime, handle))
}

fn deferred_loader(id: u64) -> LoaderRef {
    Arc::new(SimpleLoader::new(LoaderId(id), DEFERRED_LOADER))
}

fn config(delay: &str) -> Result<AgentConfig> {
    AgentConfig::from_properties([(DEFER_UNTIL, delay), (DEFER_CLASSLOADERS, DEFERRED_LOADER)])
}

#[test]
fn delay_at_threshold_never_defers() -> Result<()> {
    let config = config("5")?;
    assert!(!config.defers_matching());

    let (runtime, handle) = install(config)?;
    assert_eq!(handle.state(), MatchingState::Active);

    let loader = deferred_loader(1);
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(loader.clone()))?;
    assert_eq!(
        runtime.edits("com.foo.Bar", Some(&loader)),
        vec!["helpers[a] com.foo.HelperA", "helpers[all] com.foo.HelperAll"]
    );
    assert_eq!(handle.resume_deferred_matching()?, 0);
    Ok(())
}

#[test]
fn deferred_class_is_retransformed_on_resume() -> Result<()> {
    let config = config("10S")?;
    assert_eq!(config.defer_until, Some(Duration::from_secs(10)));
    assert!(config.defers_matching());

    let (runtime, handle) = install(config)?;
    assert_eq!(handle.state(), MatchingState::Deferring);

    let loader = deferred_loader(1);
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(loader.clone()))?;
    runtime.define(ClassDescriptor::new("org.other.Unmatched"), Some(loader.clone()))?;
    assert!(runtime.edits("com.foo.Bar", Some(&loader)).is_empty());

    // other loaders are matched normally while deferring
    let other: LoaderRef = Arc::new(SimpleLoader::new(LoaderId(2), "other.Loader"));
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(other.clone()))?;
    assert_eq!(runtime.edits("com.foo.Bar", Some(&other)).len(), 2);

    // only the deferred definition is still untransformed, but the rescan submits every
    // loaded class that would match
    assert_eq!(handle.resume_deferred_matching()?, 2);
    assert_eq!(handle.state(), MatchingState::Active);
    assert_eq!(
        runtime.retransform_batches(),
        vec![vec!["com.foo.Bar".to_string(), "com.foo.Bar".to_string()]]
    );
    assert_eq!(
        runtime.edits("com.foo.Bar", Some(&loader)),
        vec!["helpers[a] com.foo.HelperA", "helpers[all] com.foo.HelperAll"]
    );
    assert!(runtime.edits("org.other.Unmatched", Some(&loader)).is_empty());

    // a second resume is a no-op
    assert_eq!(handle.resume_deferred_matching()?, 0);
    assert_eq!(runtime.retransform_batches().len(), 1);
    Ok(())
}

#[test]
fn timer_resumes_matching_after_delay() -> Result<()> {
    let (runtime, handle) = install(config("6s")?)?;
    assert_eq!(handle.state(), MatchingState::Deferring);

    let loader = deferred_loader(1);
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(loader.clone()))?;
    assert!(runtime.edits("com.foo.Bar", Some(&loader)).is_empty());

    thread::sleep(Duration::from_secs(7));
    let deadline = Instant::now() + Duration::from_secs(10);
    while runtime.edits("com.foo.Bar", Some(&loader)).is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }

    assert_eq!(handle.state(), MatchingState::Active);
    assert_eq!(
        runtime.retransform_batches(),
        vec![vec!["com.foo.Bar".to_string()]]
    );
    assert_eq!(
        runtime.edits("com.foo.Bar", Some(&loader)),
        vec!["helpers[a] com.foo.HelperA", "helpers[all] com.foo.HelperAll"]
    );

    // the timer fires once
    assert_eq!(handle.resume_deferred_matching()?, 0);
    assert_eq!(runtime.retransform_batches().len(), 1);
    Ok(())
}

#[test]
fn initial_definitions_on_deferred_loaders_never_match() -> Result<()> {
    let modules = modules();
    let deferral = Arc::new(DeferredMatching::new(
        Some(Duration::from_secs(30)),
        [DEFERRED_LOADER],
    ));
    let mut builder = CombiningTransformerBuilder::new(Arc::new(ModuleIndex::build(&modules)?))
        .with_deferral(deferral.clone());
    for module in &modules {
        builder.register(module)?;
    }
    let pipeline = builder.build();
    let matcher = pipeline.matcher();

    let loader = deferred_loader(1);
    let class = ClassDescriptor::new("com.foo.Bar");
    let mut set = MatchSet::new();
    set.insert(ModuleId::new(7));

    assert!(!matcher.match_class(&MatchContext::define(&class, Some(&loader)), &mut set));
    assert!(set.is_empty());

    // redefinitions and the catch-up evaluation ignore deferral
    assert!(matcher.match_class(&MatchContext::redefine(&class, Some(&loader)), &mut set));
    assert!(matcher.would_match(&MatchContext::define(&class, Some(&loader)), &mut set));

    assert!(deferral.resume());
    assert!(matcher.match_class(&MatchContext::define(&class, Some(&loader)), &mut set));
    assert_eq!(set.count(), 2);
    Ok(())
}

#[test]
fn rescan_skips_excluded_and_unmodifiable_classes() -> Result<()> {
    let config = config("1m")?.with_excludes(["com.foo.internal.*"]);
    let (runtime, handle) = install(config)?;

    let loader = deferred_loader(1);
    for name in ["com.foo.Bar", "com.foo.Locked", "com.foo.internal.Hidden"] {
        runtime.define(ClassDescriptor::new(name), Some(loader.clone()))?;
    }
    runtime.set_modifiable("com.foo.Locked", false);

    assert_eq!(handle.resume_deferred_matching()?, 1);
    assert_eq!(
        runtime.retransform_batches(),
        vec![vec!["com.foo.Bar".to_string()]]
    );
    assert!(runtime.edits("com.foo.Locked", Some(&loader)).is_empty());
    Ok(())
}

#[test]
fn rejected_batch_is_reported_and_matching_stays_active() -> Result<()> {
    let (runtime, handle) = install(config("10s")?)?;

    let loader = deferred_loader(1);
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(loader.clone()))?;
    runtime.reject_retransform(true);

    assert!(matches!(
        handle.resume_deferred_matching(),
        Err(Error::Retransform(_))
    ));
    assert_eq!(handle.state(), MatchingState::Active);

    assert!(runtime.retransform_batches().is_empty());

    let late = deferred_loader(2);
    runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(late.clone()))?;
    assert_eq!(runtime.edits("com.foo.Bar", Some(&late)).len(), 2);
    Ok(())
}

#[test]
fn shutdown_cancels_pending_resume() -> Result<()> {
    let (_runtime, handle) = install(config("1h")?)?;
    let deferral = handle.pipeline().matcher().deferral().clone();

    handle.shutdown();
    assert!(deferral.is_deferring());
    Ok(())
}
