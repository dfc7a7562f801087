//! End-to-end scenarios against a deterministic `MockModelClient` (spec §8).
//!
//! Each test wires a full `Orchestrator` to a scripted client and asserts on
//! the `FinalAnswer`/error exactly as the scenario in spec §8 describes.

use std::sync::Arc;

use gateway_core::config::Config;
use gateway_core::error::GatewayError;
use gateway_core::model_client::{MockModelClient, ScriptedReply};
use gateway_core::orchestrator::Orchestrator;
use gateway_core::types::{ChatMessage, FusionStrategy, Request, StreamEvent};

fn config(yaml: &str) -> Arc<Config> {
    Arc::new(Config::from_yaml(yaml).unwrap())
}

const BASE_YAML: &str = r#"
models:
  main: main-model
  fusion: fusion-model
  summary: summary-model
  counterexample: ce-model
  vote: vote-model
upstream:
  base_url: "https://example.invalid"
  api_key_env: "NOT_SET_IN_ENV"
"#;

fn request(threads: u32, validate: bool, fusion: FusionStrategy) -> Request {
    Request {
        messages: vec![ChatMessage::user("what is the answer?")],
        stream: false,
        threads: Some(threads),
        validate: Some(validate),
        fusion: Some(fusion),
        max_steps: Some(15),
    }
}

/// Scenario 1: happy path, single thread, single step, validation off.
#[tokio::test]
async fn scenario_1_happy_path_single_step() {
    let mock = Arc::new(MockModelClient::new());
    mock.script("main-model", vec![ScriptedReply::Text("The answer is 42. <END>".into())])
        .await;

    let orchestrator = Orchestrator::new(config(BASE_YAML), mock);
    let answer = orchestrator
        .run(request(1, false, FusionStrategy::Concat), None)
        .await
        .unwrap();

    assert_eq!(answer.text, "The answer is 42. <END>");
    assert_eq!(answer.threads_completed, 1);
    assert_eq!(answer.flagged_steps, 0);
}

/// Scenario 2: two steps, the first is flagged by adversarial validation,
/// concat fusion returns the thread's last step body.
#[tokio::test]
async fn scenario_2_two_steps_flagged_step() {
    let mock = Arc::new(MockModelClient::new());
    mock.script(
        "main-model",
        vec![
            ScriptedReply::Text("partial".into()),
            ScriptedReply::Text("final. <END>".into()),
        ],
    )
    .await;
    mock.script("ce-model", vec![ScriptedReply::Text("flaw".into())]).await;
    mock.script("vote-model", vec![ScriptedReply::Text("counter".into())]).await;

    let orchestrator = Orchestrator::new(config(BASE_YAML), mock);
    let answer = orchestrator
        .run(request(1, true, FusionStrategy::Concat), None)
        .await
        .unwrap();

    assert!(answer.text.contains("final. <END>"));
    assert_eq!(answer.flagged_steps, 1);
}

/// Scenario 3: three threads, intelligent fusion merges their final answers.
#[tokio::test]
async fn scenario_3_three_threads_intelligent_fusion() {
    let mock = Arc::new(MockModelClient::new());
    mock.script("main-model", vec![ScriptedReply::Text("A<END>".into())]).await;
    mock.script("fusion-model", vec![ScriptedReply::Text("ABC".into())]).await;

    let orchestrator = Orchestrator::new(config(BASE_YAML), mock);
    let answer = orchestrator
        .run(request(3, false, FusionStrategy::Intelligent), None)
        .await
        .unwrap();

    assert_eq!(answer.text, "ABC");
    assert_eq!(answer.threads_completed, 3);
}

/// Scenario 4: one thread fails permanently, the other two complete; concat
/// fusion joins their final answers with the configured delimiter.
#[tokio::test]
async fn scenario_4_partial_failure_continues_with_survivors() {
    struct FirstCallFailsThenSucceeds {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl gateway_core::model_client::ModelClient for FirstCallFailsThenSucceeds {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: &gateway_core::model_client::InvokeOptions,
            _cancel: &gateway_core::CancelHandle,
        ) -> Result<String, GatewayError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match n {
                0 => Err(GatewayError::UpstreamUnavailable("scripted failure".into())),
                1 => Ok("X<END>".to_string()),
                _ => Ok("Y<END>".to_string()),
            }
        }
    }

    let client = Arc::new(FirstCallFailsThenSucceeds {
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let orchestrator = Orchestrator::new(config(BASE_YAML), client);
    let answer = orchestrator
        .run(request(3, false, FusionStrategy::Concat), None)
        .await
        .unwrap();

    assert_eq!(answer.threads_completed, 2);
    assert_eq!(answer.threads_failed, 1);
    assert!(answer.text.contains("X<END>"));
    assert!(answer.text.contains("Y<END>"));
}

/// Scenario 5: every thread's main call errors permanently -> `AllThreadsFailed`.
#[tokio::test]
async fn scenario_5_all_threads_fail() {
    let mock = Arc::new(MockModelClient::new());
    mock.script("main-model", vec![ScriptedReply::Error]).await;

    let orchestrator = Orchestrator::new(config(BASE_YAML), mock);
    let err = orchestrator
        .run(request(3, false, FusionStrategy::Concat), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::AllThreadsFailed));
}

/// Scenario 6: a 237-character final answer streams as five chunks of
/// 50/50/50/50/37 characters, terminated by `[DONE]`.
#[tokio::test]
async fn scenario_6_streaming_chunk_sizes() {
    let mock = Arc::new(MockModelClient::new());
    // 237 total characters, ending in the termination marker.
    let final_answer = format!("{}<END>", "z".repeat(232));
    assert_eq!(final_answer.len(), 237);
    mock.script("main-model", vec![ScriptedReply::Text(final_answer.clone())])
        .await;

    let orchestrator = Orchestrator::new(config(BASE_YAML), mock);
    let mut req = request(1, false, FusionStrategy::Concat);
    req.stream = true;
    let events = orchestrator.run_stream(req, None).await.unwrap();

    let deltas: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Delta(d) => Some(d.clone()),
            StreamEvent::Done => None,
        })
        .collect();
    let sizes: Vec<usize> = deltas.iter().map(|d| d.len()).collect();
    assert_eq!(sizes, vec![50, 50, 50, 50, 37]);
    assert_eq!(deltas.concat(), final_answer);
    assert!(matches!(events.last(), Some(StreamEvent::Done)));
}
