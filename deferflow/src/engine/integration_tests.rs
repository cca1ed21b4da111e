//! End-to-end tests for the engine: settlement, cleanup order, adapters
//! and diagnostics.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::defer::DeferHandle;
    use crate::diagnostics::{
        CleanupDiagnostic, CleanupFailureKind, CollectingDiagnosticSink, DiagnosticSink,
        ASYNC_CLEANUP_PREFIX, SYNC_CLEANUP_PREFIX,
    };
    use crate::engine::{
        run_capturing, run_capturing_sync, run_handled, run_handled_sync, run_propagating,
        run_propagating_sync, Engine, Settlement,
    };
    use crate::errors::{CapturedError, ErrorOrigin, NON_ERROR_PREFIX};
    use crate::testing::CallLog;
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        Sink {}

        #[async_trait]
        impl DiagnosticSink for Sink {
            async fn emit(&self, diagnostic: CleanupDiagnostic);
            fn try_emit(&self, diagnostic: CleanupDiagnostic);
        }
    }

    fn collecting_engine() -> (Engine, Arc<CollectingDiagnosticSink>) {
        let sink = Arc::new(CollectingDiagnosticSink::new());
        let engine = Engine::with_config(EngineConfig::new().with_label("tests")).with_sink(sink.clone());
        (engine, sink)
    }

    // --- scenarios ---

    #[test]
    fn test_value_with_no_cleanup_failures() {
        let (engine, sink) = collecting_engine();
        let log = CallLog::new();

        let captured = engine.run_capturing_sync(|defer| {
            defer.defer(log.recorder("close"));
            anyhow::Ok(42)
        });

        assert_eq!(captured.value(), Some(&42));
        assert!(captured.error().is_none());
        assert_eq!(log.entries(), vec!["close"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_cleanups_run_before_error_propagates() {
        let (engine, sink) = collecting_engine();
        let log = CallLog::new();

        let result = engine.run_propagating_sync(|defer| {
            defer.defer(log.recorder("A"));
            defer.defer(log.recorder("B"));
            Err::<(), _>(anyhow::anyhow!("boom"))
        });

        assert_eq!(result.unwrap_err().message(), "boom");
        assert_eq!(log.entries(), vec!["A", "B"]);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_async_cleanup_is_reported_later() {
        let (engine, sink) = collecting_engine();

        let captured = engine
            .run_capturing(|defer| {
                defer.defer_async_named("flush", || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<(), _>(anyhow::anyhow!("flush failed"))
                });
                Settlement::pending(async { anyhow::Ok("ok") })
            })
            .await;

        assert_eq!(captured.value(), Some(&"ok"));
        assert!(sink.wait_for(1, Duration::from_secs(2)).await);

        let diagnostics = sink.of_kind(CleanupFailureKind::Async);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].error.message(), "flush failed");
        assert_eq!(diagnostics[0].callback.as_deref(), Some("flush"));
        assert!(diagnostics[0].summary().starts_with(ASYNC_CLEANUP_PREFIX));
    }

    // --- cleanup after settlement ---

    #[test]
    fn test_sync_cleanup_runs_after_each_outcome() {
        for case in ["success", "error", "panic"] {
            let log = CallLog::new();
            let action_log = log.clone();

            let captured = run_capturing_sync(move |defer| {
                defer.defer(action_log.recorder("cleanup"));
                action_log.record("action");
                match case {
                    "success" => Ok(1),
                    "error" => Err(anyhow::anyhow!("failed")),
                    _ => panic!("panicked"),
                }
            });

            assert_eq!(log.entries(), vec!["action", "cleanup"], "case {case}");
            assert_eq!(captured.is_ok(), case == "success", "case {case}");
        }
    }

    #[tokio::test]
    async fn test_async_cleanup_waits_for_settlement() {
        for case in ["success", "rejected", "panic"] {
            let log = CallLog::new();
            let action_log = log.clone();

            let completion = run_capturing(move |defer| {
                defer.defer(action_log.recorder("cleanup"));
                Settlement::pending(async move {
                    tokio::task::yield_now().await;
                    action_log.record("settled");
                    match case {
                        "success" => Ok(1),
                        "rejected" => Err(anyhow::anyhow!("rejected")),
                        _ => panic!("panicked in future"),
                    }
                })
            });

            assert!(!completion.is_ready());
            assert!(log.is_empty(), "case {case}");

            let captured = completion.await;
            assert_eq!(log.entries(), vec!["settled", "cleanup"], "case {case}");
            assert_eq!(captured.is_ok(), case == "success", "case {case}");
        }
    }

    #[test]
    fn test_ready_result_completes_without_awaiting() {
        let log = CallLog::new();
        let action_log = log.clone();

        let completion = run_capturing(move |defer| {
            defer.defer(action_log.recorder("cleanup"));
            anyhow::Ok(7)
        });

        assert!(completion.is_ready());
        assert_eq!(log.entries(), vec!["cleanup"]);
        assert_eq!(completion.into_ready().unwrap().value(), Some(&7));
    }

    #[test]
    fn test_pending_completion_can_be_waited_without_runtime() {
        let completion = run_propagating(|_defer| Settlement::pending(async { anyhow::Ok(3) }));
        assert_eq!(completion.wait(), Ok(3));
    }

    // --- ordering and isolation ---

    #[test]
    fn test_mixed_callbacks_run_fifo() {
        let (engine, sink) = collecting_engine();
        let log = CallLog::new();

        let captured = engine.run_capturing_sync(|defer| {
            defer.defer(log.recorder("first"));
            let async_log = log.clone();
            defer.defer_async(move || async move { async_log.record("second") });
            defer.defer(|| Err::<(), _>(anyhow::anyhow!("third fails")));
            defer.defer(log.recorder("fourth"));
            anyhow::Ok(())
        });

        assert!(captured.is_ok());
        assert_eq!(log.entries(), vec!["first", "second", "fourth"]);
        assert_eq!(sink.messages(), vec!["third fails"]);
    }

    #[test]
    fn test_failing_cleanup_does_not_change_outcome() {
        let (engine, sink) = collecting_engine();

        let ok = engine.run_propagating_sync(|defer| {
            defer.defer_named("close", || -> anyhow::Result<()> { panic!("close panicked") });
            anyhow::Ok("value")
        });
        assert_eq!(ok, Ok("value"));

        let err = engine.run_propagating_sync(|defer| {
            defer.defer(|| Err::<(), _>(anyhow::anyhow!("cleanup error")));
            Err::<(), _>(anyhow::anyhow!("action error"))
        });
        assert_eq!(err.unwrap_err().message(), "action error");

        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].kind, CleanupFailureKind::Sync);
        assert_eq!(diagnostics[0].callback.as_deref(), Some("close"));
        assert!(diagnostics[0].error.is_panic());
        assert!(diagnostics[0].summary().starts_with(SYNC_CLEANUP_PREFIX));
        assert_eq!(diagnostics[1].error.message(), "cleanup error");
        assert_eq!(diagnostics[1].label.as_deref(), Some("tests"));
        assert!(diagnostics[1].invocation_id.is_some());
        assert_ne!(diagnostics[0].invocation_id, diagnostics[1].invocation_id);
    }

    #[test]
    fn test_nested_runs_unwind_inner_first() {
        let log = CallLog::new();

        let captured = run_capturing_sync(|outer| {
            outer.defer(log.recorder("outer cleanup"));
            let inner = run_capturing_sync(|defer| {
                defer.defer(log.recorder("inner cleanup"));
                log.record("inner action");
                anyhow::Ok(1)
            });
            log.record("outer rest");
            inner.into_result().map_err(anyhow::Error::from)
        });

        assert_eq!(captured.value(), Some(&1));
        assert_eq!(
            log.entries(),
            vec!["inner action", "inner cleanup", "outer rest", "outer cleanup"]
        );
    }

    #[tokio::test]
    async fn test_nested_async_runs_unwind_inner_first() {
        let log = CallLog::new();
        let outer_log = log.clone();

        let captured = run_capturing(move |outer| {
            outer.defer(outer_log.recorder("outer cleanup"));
            Settlement::pending(async move {
                let inner_log = outer_log.clone();
                let inner = run_capturing(move |defer| {
                    defer.defer(inner_log.recorder("inner cleanup"));
                    Settlement::pending(async move {
                        tokio::task::yield_now().await;
                        inner_log.record("inner action");
                        anyhow::Ok(2)
                    })
                })
                .await;
                outer_log.record("outer rest");
                inner.into_result().map_err(anyhow::Error::from)
            })
        })
        .await;

        assert_eq!(captured.value(), Some(&2));
        assert_eq!(
            log.entries(),
            vec!["inner action", "inner cleanup", "outer rest", "outer cleanup"]
        );
    }

    #[test]
    fn test_late_registration_is_rejected() {
        let mut escaped = None;

        let captured = run_capturing_sync(|defer: DeferHandle| {
            escaped = Some(defer.clone());
            anyhow::Ok(())
        });

        assert!(captured.is_ok());
        let handle = escaped.unwrap();
        assert!(handle.is_drained());
        assert!(!handle.defer(|| {}));
        assert_eq!(handle.pending_count(), 0);
    }

    // --- value-return adapter ---

    #[test]
    fn test_value_slot_holds_falsy_values() {
        let unit = run_capturing_sync(|_| anyhow::Ok(()));
        assert_eq!(unit.value(), Some(&()));
        assert!(unit.error().is_none());

        let zero = run_capturing_sync(|_| anyhow::Ok(0));
        assert_eq!(zero.into_parts(), (Some(0), None));

        let falsy = run_capturing_sync(|_| anyhow::Ok(false));
        assert_eq!(falsy.value(), Some(&false));

        let none = run_capturing_sync(|_| anyhow::Ok(None::<u8>));
        assert_eq!(none.value(), Some(&None));

        let composite = run_capturing_sync(|_| anyhow::Ok(vec![("a", 1), ("b", 2)]));
        assert_eq!(composite.value(), Some(&vec![("a", 1), ("b", 2)]));
    }

    #[test]
    fn test_thrown_null_still_counts_as_failure() {
        let captured = run_capturing_sync(|_| -> anyhow::Result<u8> {
            std::panic::panic_any(serde_json::Value::Null)
        });

        let (value, error) = captured.into_parts();
        assert!(value.is_none());
        let error = error.unwrap();
        assert_eq!(error.origin(), ErrorOrigin::Value);
        assert_eq!(error.message(), format!("{NON_ERROR_PREFIX}: null"));
    }

    // --- reraise adapter ---

    #[test]
    fn test_reraise_keeps_error_identity() {
        let original = CapturedError::with_cause("db down", std::io::Error::other("refused"));

        let returned = original.clone();
        let err = run_propagating_sync(move |_| Err::<(), _>(returned)).unwrap_err();
        assert_eq!(err, original);
        assert!(err.downcast_cause::<std::io::Error>().is_some());

        let panicked = original.clone();
        let err = run_propagating_sync(move |_| -> anyhow::Result<()> {
            std::panic::panic_any(panicked)
        })
        .unwrap_err();
        assert_eq!(err, original);
    }

    #[test]
    fn test_reraise_returns_same_shared_value() {
        let shared = Arc::new(vec![1_u8, 2, 3]);
        let returned = shared.clone();

        let value = run_propagating_sync(move |_| anyhow::Ok(returned)).unwrap();
        assert!(Arc::ptr_eq(&value, &shared));
    }

    #[tokio::test]
    async fn test_reraise_async_returns_same_shared_value() {
        let shared = Arc::new(String::from("payload"));
        let returned = shared.clone();

        let value = run_propagating(move |_| Settlement::pending(async move { anyhow::Ok(returned) }))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&value, &shared));
    }

    #[test]
    fn test_reraise_keeps_original_error_type() {
        let err = run_propagating_sync(|_| "x".parse::<u32>()).unwrap_err();

        assert_eq!(err.message(), "invalid digit found in string");
        assert!(err.downcast_cause::<std::num::ParseIntError>().is_some());
        assert!(err.cause_chain().is_empty());
    }

    #[tokio::test]
    async fn test_reraise_async_rejection() {
        let err = run_propagating(|_| {
            Settlement::pending(async { Err::<u8, _>(std::io::Error::other("socket closed")) })
        })
        .await
        .unwrap_err();

        assert_eq!(err.message(), "socket closed");
        assert_eq!(err.origin(), ErrorOrigin::Error);
    }

    // --- dispatch adapter ---

    #[test]
    fn test_dispatch_calls_handler_once_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        run_handled_sync(
            move |error: CapturedError| {
                assert_eq!(error.message(), "bad input");
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| Err::<(), _>(anyhow::anyhow!("bad input")),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = calls.clone();
        run_handled_sync(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| anyhow::Ok(5),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_async() {
        let calls = Arc::new(AtomicUsize::new(0));
        let log = CallLog::new();

        let counter = calls.clone();
        let action_log = log.clone();
        let handler_log = log.clone();
        run_handled(
            move |_| {
                handler_log.record("handler");
                counter.fetch_add(1, Ordering::SeqCst);
            },
            move |defer| {
                defer.defer(action_log.recorder("cleanup"));
                Settlement::pending(async {
                    tokio::task::yield_now().await;
                    Err::<(), _>(anyhow::anyhow!("late failure"))
                })
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.entries(), vec!["cleanup", "handler"]);

        let counter = calls.clone();
        run_handled(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |_| Settlement::pending(async { anyhow::Ok(()) }),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // --- settlement shape ---

    #[tokio::test]
    async fn test_plain_closure_returning_future_drains_after_it() {
        let log = CallLog::new();
        let action_log = log.clone();

        // The closure itself is not async; the returned settlement decides.
        let completion = Engine::new().run_propagating(move |defer| {
            defer.defer(action_log.recorder("cleanup"));
            let future_log = action_log.clone();
            Settlement::pending(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                future_log.record("future");
                anyhow::Ok("done")
            })
        });

        assert!(log.is_empty());
        assert_eq!(completion.await, Ok("done"));
        assert_eq!(log.entries(), vec!["future", "cleanup"]);
    }

    #[tokio::test]
    async fn test_registration_after_await_inside_action() {
        let log = CallLog::new();
        let action_log = log.clone();

        let captured = run_capturing(move |defer| {
            Settlement::pending(async move {
                defer.defer(action_log.recorder("c1"));
                tokio::task::yield_now().await;
                defer.defer(action_log.recorder("c2"));
                action_log.record("body done");
                anyhow::Ok(())
            })
        })
        .await;

        assert!(captured.is_ok());
        assert_eq!(log.entries(), vec!["body done", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_mixed_callbacks_run_fifo_under_async_action() {
        let log = CallLog::new();
        let action_log = log.clone();

        let captured = run_capturing(move |defer| {
            defer.defer(action_log.recorder("s1"));
            let async_log = action_log.clone();
            defer.defer_async(move || async move {
                async_log.record("a2");
                tokio::task::yield_now().await;
                async_log.record("a2 tail");
            });
            Settlement::pending(async move {
                tokio::task::yield_now().await;
                defer.defer(action_log.recorder("s3"));
                let async_log = action_log.clone();
                defer.defer_async(move || async move { async_log.record("a4") });
                action_log.record("settled");
                anyhow::Ok(())
            })
        })
        .await;

        assert!(captured.is_ok());
        assert_eq!(log.entries(), vec!["settled", "s1", "a2", "s3", "a4"]);

        let tail_done = tokio::time::timeout(Duration::from_secs(2), async {
            while log.len() < 6 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(tail_done.is_ok());
        assert_eq!(log.entries(), vec!["settled", "s1", "a2", "s3", "a4", "a2 tail"]);
    }

    // --- abandoned completions ---

    #[tokio::test]
    async fn test_timed_out_completion_still_runs_cleanup() {
        let log = CallLog::new();
        let action_log = log.clone();

        let completion = run_capturing(move |defer| {
            defer.defer(action_log.recorder("cleanup"));
            Settlement::pending(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                anyhow::Ok(())
            })
        });
        let result = tokio::time::timeout(Duration::from_millis(20), completion).await;

        assert!(result.is_err());
        assert_eq!(log.entries(), vec!["cleanup"]);
    }

    #[test]
    fn test_dropped_completion_still_runs_cleanup() {
        let (engine, sink) = collecting_engine();
        let log = CallLog::new();
        let action_log = log.clone();

        let completion = engine.run_capturing(move |defer| {
            defer.defer(action_log.recorder("first"));
            defer.defer(|| Err::<(), _>(anyhow::anyhow!("second fails")));
            defer.defer(action_log.recorder("third"));
            Settlement::pending(futures::future::pending::<anyhow::Result<()>>())
        });
        assert!(log.is_empty());

        drop(completion);
        assert_eq!(log.entries(), vec!["first", "third"]);
        assert_eq!(sink.messages(), vec!["second fails"]);
    }

    // --- diagnostic routing ---

    #[test]
    fn test_injected_sink_receives_sync_failures() {
        let mut sink = MockSink::new();
        sink.expect_try_emit()
            .withf(|d| d.kind == CleanupFailureKind::Sync && d.error.message() == "disk full")
            .times(1)
            .return_const(());
        sink.expect_emit().never();

        let engine = Engine::new().with_sink(Arc::new(sink));
        let captured = engine.run_capturing_sync(|defer| {
            defer.defer(|| Err::<(), _>(std::io::Error::other("disk full")));
            anyhow::Ok(1)
        });

        assert_eq!(captured.value(), Some(&1));
    }

    #[test]
    fn test_engine_without_failures_never_touches_sink() {
        let mut sink = MockSink::new();
        sink.expect_try_emit().never();
        sink.expect_emit().never();

        let engine = Engine::new().with_sink(Arc::new(sink));
        let captured = engine.run_capturing_sync(|defer| {
            defer.defer(|| {});
            defer.defer_async(|| async {});
            anyhow::Ok(())
        });

        assert!(captured.is_ok());
    }

    #[test]
    fn test_engine_debug_and_config() {
        let (engine, _sink) = collecting_engine();
        assert_eq!(engine.config().label.as_deref(), Some("tests"));

        let debug = format!("{engine:?}");
        assert!(debug.contains("injected_sink: true"));
    }
}
