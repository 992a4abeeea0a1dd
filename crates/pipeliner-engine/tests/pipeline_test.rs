use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use pipeliner_engine::{
  BoxError, ChannelNotifier, Pipeline, PipelineConfig, PipelineError, PipelineEvent,
  PipelineNotifier, Step, StepArgs, StepOutcome, Value,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

type WorkFuture = BoxFuture<'static, Result<Value, BoxError>>;

const NO_INPUTS: [&str; 0] = [];

fn counted(calls: Arc<AtomicUsize>, value: Value) -> impl Fn(StepArgs) -> WorkFuture + Send + Sync + 'static {
  move |_args: StepArgs| {
    let calls = Arc::clone(&calls);
    let value = value.clone();
    async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok::<Value, BoxError>(value)
    }
    .boxed()
  }
}

fn sleeping(duration: Duration, value: Value) -> impl Fn(StepArgs) -> WorkFuture + Send + Sync + 'static {
  move |_args: StepArgs| {
    let value = value.clone();
    async move {
      tokio::time::sleep(duration).await;
      Ok::<Value, BoxError>(value)
    }
    .boxed()
  }
}

fn failing(calls: Arc<AtomicUsize>, message: &'static str) -> impl Fn(StepArgs) -> WorkFuture + Send + Sync + 'static {
  move |_args: StepArgs| {
    let calls = Arc::clone(&calls);
    async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(10)).await;
      Err::<Value, BoxError>(message.into())
    }
    .boxed()
  }
}

async fn divide(args: StepArgs) -> Result<Value, BoxError> {
  let base: i64 = args.value("base")?;
  let divisor: i64 = args.value("divisor")?;
  Ok(json!([base.div_euclid(divisor), base.rem_euclid(divisor)]))
}

async fn get_division(args: StepArgs) -> Result<Value, BoxError> {
  Ok(json!([
    args.get("base"),
    args.get("result"),
    args.get("modulus")
  ]))
}

struct Calls {
  base: Arc<AtomicUsize>,
  divide: Arc<AtomicUsize>,
}

/// base_provider -> base; divide(base, divisor) -> (result, modulus);
/// get_division(base, result, modulus).
fn register_division<N: PipelineNotifier>(pipeline: &mut Pipeline<N>) -> Calls {
  let calls = Calls {
    base: Arc::new(AtomicUsize::new(0)),
    divide: Arc::new(AtomicUsize::new(0)),
  };

  pipeline
    .register("base_provider", NO_INPUTS, ["base"], counted(Arc::clone(&calls.base), json!(23)))
    .unwrap();

  let divide_calls = Arc::clone(&calls.divide);
  pipeline
    .register(
      "divide",
      ["base", "divisor"],
      ["result", "modulus"],
      move |args: StepArgs| {
        divide_calls.fetch_add(1, Ordering::SeqCst);
        divide(args).boxed()
      },
    )
    .unwrap();

  pipeline
    .register(
      "get_division",
      ["base", "result", "modulus"],
      NO_INPUTS,
      get_division,
    )
    .unwrap();

  calls
}

#[tokio::test]
async fn test_run_step_resolves_whole_graph() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);

  let outcome = pipeline
    .run_step("get_division", &[("divisor", json!(3))])
    .await
    .unwrap();

  assert_eq!(outcome, StepOutcome::Completed(json!([23, 7, 2])));
  assert_eq!(calls.base.load(Ordering::SeqCst), 1);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 1);
  assert_eq!(pipeline.store().value("modulus"), Some(json!(2)));
}

#[tokio::test]
async fn test_supplied_resource_skips_its_producer() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline.supply("base", json!(10)).unwrap();

  let outcome = pipeline
    .run_step("get_division", &[("divisor", json!(3))])
    .await
    .unwrap();

  assert_eq!(outcome.into_value(), Some(json!([10, 3, 1])));
  assert_eq!(calls.base.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_step_with_resolved_output_is_skipped() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline
    .supply_resources([("base", json!(23)), ("divisor", json!(3))])
    .unwrap();
  pipeline.supply("modulus", json!(2)).unwrap();

  let outcome = pipeline.run_step("divide", &[]).await.unwrap();

  assert_eq!(
    outcome,
    StepOutcome::Skipped {
      resource: "modulus".to_string()
    }
  );
  assert_eq!(calls.divide.load(Ordering::SeqCst), 0);
  assert!(!pipeline.is_resource_ready("result"));
}

#[tokio::test]
async fn test_sibling_of_skipped_step_is_unproducible() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline
    .supply_resources([("divisor", json!(3)), ("modulus", json!(2))])
    .unwrap();

  let err = pipeline.check(&["result"]).unwrap_err();
  assert!(matches!(
    err,
    PipelineError::Unproducible { ref resource, ref step, ref resolved }
      if resource == "result" && step == "divide" && resolved == "modulus"
  ));

  let err = tokio::time::timeout(Duration::from_secs(2), pipeline.request_resources(["result"]))
    .await
    .expect("request for an unproducible resource must not hang")
    .unwrap_err();
  assert!(matches!(err, PipelineError::Unproducible { ref resource, .. } if resource == "result"));
  assert_eq!(calls.divide.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sibling_of_skipped_step_fails_at_run_time_without_preflight() {
  let mut pipeline = Pipeline::with_config(PipelineConfig::default().with_detect_cycles(false));
  let calls = register_division(&mut pipeline);
  pipeline
    .supply_resources([("divisor", json!(3)), ("modulus", json!(2))])
    .unwrap();

  let err = tokio::time::timeout(Duration::from_secs(2), pipeline.run_step("get_division", &[]))
    .await
    .expect("step run must not hang on an unproducible input")
    .unwrap_err();
  assert!(matches!(
    err.root_cause(),
    PipelineError::Unproducible { resource, step, resolved }
      if resource == "result" && step == "divide" && resolved == "modulus"
  ));
  assert_eq!(calls.divide.load(Ordering::SeqCst), 0);
  assert!(!pipeline.is_resource_ready("result"));
}

#[tokio::test]
async fn test_repeated_requests_reuse_memoized_values() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline.supply("divisor", json!(7)).unwrap();

  let first = pipeline.request_resources(["result"]).await.unwrap();
  let second = pipeline
    .request_resources(["result", "modulus", "base"])
    .await
    .unwrap();

  assert_eq!(first["result"], json!(3));
  assert_eq!(second["modulus"], json!(2));
  assert_eq!(second["base"], json!(23));
  assert_eq!(calls.base.load(Ordering::SeqCst), 1);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_produce_each_resource_once() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline.supply("divisor", json!(3)).unwrap();
  let pipeline = Arc::new(pipeline);

  let handles: Vec<_> = (0..8)
    .map(|i| {
      let pipeline = Arc::clone(&pipeline);
      let name = if i % 2 == 0 { "result" } else { "modulus" };
      (name, tokio::spawn(async move { pipeline.request_resources([name]).await }))
    })
    .collect();

  for (name, handle) in handles {
    let resources = handle.await.unwrap().unwrap();
    assert_eq!(resources.len(), 1);
    let expected = if name == "result" { json!(7) } else { json!(2) };
    assert_eq!(resources[name], expected);
  }

  assert_eq!(calls.base.load(Ordering::SeqCst), 1);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 1);
  assert_eq!(pipeline.store().value("result"), Some(json!(7)));
}

#[tokio::test]
async fn test_concurrent_step_runs_share_one_producer() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);

  let args_a = [("divisor", json!(3))];
  let args_b = [("divisor", json!(3))];
  let (a, b) = tokio::join!(
    pipeline.run_step("divide", &args_a),
    pipeline.run_step("divide", &args_b),
  );

  let outcomes = [a.unwrap(), b.unwrap()];
  assert_eq!(outcomes.iter().filter(|o| o.is_skipped()).count(), 1);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 1);
  assert_eq!(calls.base.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_output_count_must_match_declaration() {
  let mut pipeline = Pipeline::new();
  pipeline
    .register("split", NO_INPUTS, ["result", "modulus"], |_args: StepArgs| {
      async { Ok::<Value, BoxError>(json!([1, 2, 3])) }.boxed()
    })
    .unwrap();

  let err = pipeline.run_step("split", &[]).await.unwrap_err();
  assert!(matches!(
    err,
    PipelineError::OutputArityMismatch { ref step, expected: 2, actual: 3 } if step == "split"
  ));
  assert!(!pipeline.is_resource_ready("result"));

  let err = pipeline.request_resources(["modulus"]).await.unwrap_err();
  assert!(matches!(
    err.root_cause(),
    PipelineError::OutputArityMismatch { actual: 3, .. }
  ));
}

#[tokio::test]
async fn test_two_outputs_need_two_values() {
  let mut pipeline = Pipeline::new();
  pipeline
    .register("one", NO_INPUTS, ["a", "b"], |_args: StepArgs| {
      async { Ok::<Value, BoxError>(json!(5)) }.boxed()
    })
    .unwrap();
  pipeline
    .register("two", NO_INPUTS, ["c", "d"], |_args: StepArgs| {
      async { Ok::<Value, BoxError>(json!([5, 6])) }.boxed()
    })
    .unwrap();

  let err = pipeline.run_step("one", &[]).await.unwrap_err();
  assert!(matches!(
    err,
    PipelineError::OutputArityMismatch { expected: 2, actual: 1, .. }
  ));

  let outcome = pipeline.run_step("two", &[]).await.unwrap();
  assert_eq!(outcome, StepOutcome::Completed(json!([5, 6])));
  assert_eq!(pipeline.store().value("c"), Some(json!(5)));
  assert_eq!(pipeline.store().value("d"), Some(json!(6)));
}

#[tokio::test]
async fn test_missing_provider_is_reported() {
  let mut pipeline = Pipeline::new();
  register_division(&mut pipeline);

  let err = pipeline.request_resources(["result"]).await.unwrap_err();
  assert!(matches!(
    err,
    PipelineError::MissingProvider { ref resource, required_by: Some(ref step) }
      if resource == "divisor" && step == "divide"
  ));

  let err = pipeline.request_resources(["nothing"]).await.unwrap_err();
  assert!(matches!(
    err,
    PipelineError::MissingProvider { required_by: None, .. }
  ));
}

#[tokio::test]
async fn test_missing_provider_found_at_run_time_without_preflight() {
  let mut pipeline = Pipeline::with_config(PipelineConfig::default().with_detect_cycles(false));
  let calls = register_division(&mut pipeline);

  let err = pipeline.request_resources(["result"]).await.unwrap_err();
  assert!(matches!(err, PipelineError::UpstreamFailure { ref resource, .. } if resource == "result"));
  assert!(matches!(
    err.root_cause(),
    PipelineError::MissingProvider { resource, .. } if resource == "divisor"
  ));
  // Inputs resolve side by side, so base is still produced.
  assert_eq!(calls.base.load(Ordering::SeqCst), 1);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cycle_is_rejected_before_running() {
  let calls = Arc::new(AtomicUsize::new(0));
  let mut pipeline = Pipeline::new();
  pipeline
    .register("a", ["y"], ["x"], counted(Arc::clone(&calls), json!(1)))
    .unwrap();
  pipeline
    .register("b", ["x"], ["y"], counted(Arc::clone(&calls), json!(2)))
    .unwrap();

  let err = pipeline.request_resources(["x"]).await.unwrap_err();
  assert!(matches!(err, PipelineError::DependencyCycle { ref path } if path == &["a", "b", "a"]));
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // Supplying one side of the loop breaks it.
  pipeline.supply("y", json!(5)).unwrap();
  let resources = pipeline.request_resources(["x"]).await.unwrap();
  assert_eq!(resources["x"], json!(1));
}

#[tokio::test]
async fn test_provider_failure_reaches_every_awaiter() {
  let failures = Arc::new(AtomicUsize::new(0));
  let mut pipeline = Pipeline::new();
  pipeline
    .register("base_provider", NO_INPUTS, ["base"], failing(Arc::clone(&failures), "disk on fire"))
    .unwrap();
  pipeline
    .register("divide", ["base", "divisor"], ["result", "modulus"], divide)
    .unwrap();
  pipeline.supply("divisor", json!(3)).unwrap();

  let (a, b) = tokio::join!(
    pipeline.request_resources(["result"]),
    pipeline.request_resources(["base"]),
  );

  for err in [a.unwrap_err(), b.unwrap_err()] {
    assert!(matches!(
      err.root_cause(),
      PipelineError::Work { step, .. } if step == "base_provider"
    ));
  }
  assert_eq!(failures.load(Ordering::SeqCst), 1);
  assert!(!pipeline.store().is_pending("result"));

  // A failed resource can be requested again.
  let err = pipeline.request_resources(["base"]).await.unwrap_err();
  assert!(err.to_string().contains("disk on fire"));
  assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_variadic_inputs_are_gathered_in_order() {
  let mut pipeline = Pipeline::new();
  let step = Step::builder("collect")
    .input("first")
    .variadic("b")
    .variadic("a")
    .output("all")
    .work(|args: StepArgs| {
      async move {
        Ok::<Value, BoxError>(json!({
          "first": args.get("first"),
          "rest": args.variadic(),
          "named": args.named().len(),
        }))
      }
      .boxed()
    })
    .build()
    .unwrap();
  pipeline.register_step(step);

  let outcome = pipeline
    .run_step("collect", &[("first", json!(0)), ("a", json!(1)), ("b", json!(2))])
    .await
    .unwrap();

  assert_eq!(
    outcome.into_value(),
    Some(json!([{ "first": 0, "rest": [2, 1], "named": 1 }]))
  );
}

#[tokio::test]
async fn test_first_registered_provider_wins() {
  let first = Arc::new(AtomicUsize::new(0));
  let second = Arc::new(AtomicUsize::new(0));
  let mut pipeline = Pipeline::new();
  pipeline
    .register("base_provider", NO_INPUTS, ["base"], counted(Arc::clone(&first), json!(1)))
    .unwrap();
  pipeline
    .register("other_base", NO_INPUTS, ["base"], counted(Arc::clone(&second), json!(2)))
    .unwrap();

  let resources = pipeline.request_resources(["base"]).await.unwrap();

  assert_eq!(resources["base"], json!(1));
  assert_eq!(first.load(Ordering::SeqCst), 1);
  assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reset_reruns_producers_and_keeps_external() {
  let mut pipeline = Pipeline::new();
  let calls = register_division(&mut pipeline);
  pipeline.supply("divisor", json!(3)).unwrap();

  pipeline.request_resources(["result"]).await.unwrap();
  assert_eq!(pipeline.reset_resources(true), 3);
  assert!(pipeline.is_resource_ready("divisor"));
  assert!(!pipeline.is_resource_ready("base"));

  pipeline.request_resources(["result"]).await.unwrap();
  assert_eq!(calls.base.load(Ordering::SeqCst), 2);
  assert_eq!(calls.divide.load(Ordering::SeqCst), 2);

  pipeline.reset_resources(false);
  assert!(pipeline.store().is_empty());
}

#[tokio::test]
async fn test_reset_releases_resource_waiters() {
  let pipeline = Arc::new(Pipeline::new());

  let waiter = {
    let pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move { pipeline.resource("base").await })
  };
  while pipeline.store().is_empty() {
    tokio::task::yield_now().await;
  }

  assert_eq!(pipeline.reset_resources(false), 1);
  pipeline.supply("base", json!(1)).unwrap();

  let err = tokio::time::timeout(Duration::from_secs(1), waiter)
    .await
    .expect("waiter was not released by the reset")
    .unwrap()
    .unwrap_err();
  assert!(matches!(err, PipelineError::UpstreamFailure { ref resource, .. } if resource == "base"));
  assert!(err.to_string().contains("reset"));
  assert_eq!(pipeline.resource("base").await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_supply_conflicts_with_resolved_value() {
  let pipeline = Pipeline::new()
    .with_resources([("base", json!(23))])
    .unwrap();

  pipeline.supply("base", json!(23)).unwrap();
  let err = pipeline.supply("base", json!(10)).unwrap_err();
  assert!(matches!(err, PipelineError::AlreadyResolved { resource } if resource == "base"));
  assert_eq!(pipeline.store().value("base"), Some(json!(23)));
}

#[tokio::test]
async fn test_unknown_step_is_rejected() {
  let pipeline = Pipeline::new();
  let err = pipeline.run_step("nope", &[]).await.unwrap_err();
  assert!(matches!(err, PipelineError::UnknownStep { step } if step == "nope"));
}

#[tokio::test]
async fn test_invalid_step_is_rejected_at_registration() {
  let mut pipeline = Pipeline::new();
  let err = pipeline
    .register("divide", ["base", "base"], ["result"], divide)
    .unwrap_err();
  assert!(matches!(err, PipelineError::InvalidStep(_)));
  assert!(pipeline.registry().is_empty());
}

#[tokio::test]
async fn test_resource_waits_for_external_value() {
  let pipeline = Arc::new(Pipeline::new());

  let waiter = {
    let pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move { pipeline.resource("base").await })
  };
  tokio::task::yield_now().await;
  pipeline.supply("base", json!(42)).unwrap();

  assert_eq!(waiter.await.unwrap().unwrap(), json!(42));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_releases_claimed_resources() {
  let mut pipeline = Pipeline::new();
  pipeline
    .register(
      "slow",
      NO_INPUTS,
      ["slow"],
      sleeping(Duration::from_secs(60), json!(1)),
    )
    .unwrap();

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let err = pipeline
    .request_resources_with(["slow"], cancel)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Cancelled));
  assert!(!pipeline.store().is_pending("slow"));
  assert!(!pipeline.is_resource_ready("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out() {
  let config = PipelineConfig::default().with_request_timeout(Duration::from_millis(100));
  let mut pipeline = Pipeline::with_config(config);
  pipeline
    .register(
      "slow",
      NO_INPUTS,
      ["slow"],
      sleeping(Duration::from_secs(60), json!(1)),
    )
    .unwrap();

  let err = pipeline.request_resources(["slow"]).await.unwrap_err();

  assert!(matches!(err, PipelineError::Timeout { timeout_ms: 100 }));
  assert!(!pipeline.store().is_pending("slow"));
}

#[tokio::test]
async fn test_events_describe_execution() {
  let (notifier, mut receiver) = ChannelNotifier::channel();
  let mut pipeline = Pipeline::with_notifier(PipelineConfig::default(), notifier);
  register_division(&mut pipeline);
  pipeline.supply("divisor", json!(3)).unwrap();

  pipeline.run_step("get_division", &[]).await.unwrap();
  pipeline.run_step("base_provider", &[]).await.unwrap();

  let mut events = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    events.push(event);
  }

  assert_eq!(
    events.first(),
    Some(&PipelineEvent::ResourceSupplied {
      resource: "divisor".to_string()
    })
  );
  assert!(events.contains(&PipelineEvent::ResourcePublished {
    resource: "base".to_string(),
    step: "base_provider".to_string(),
  }));
  assert!(events.contains(&PipelineEvent::StepCompleted {
    step: "get_division".to_string()
  }));
  assert_eq!(
    events.last(),
    Some(&PipelineEvent::StepSkipped {
      step: "base_provider".to_string(),
      resource: "base".to_string(),
    })
  );

  let started = events
    .iter()
    .filter(|e| matches!(e, PipelineEvent::StepStarted { .. }))
    .count();
  assert_eq!(started, 3);
}
