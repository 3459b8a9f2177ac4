mod common;

use anyhow::Result;
use common::{Probe, StaticNetwork, fake_factory, init_logging, lock, providers, quick_config};
use core::sync::atomic::Ordering;
use core::time::Duration;
use dom_session::{Session, SessionConfig, SessionError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::time::sleep;

async fn session_with(probe: &Arc<Probe>, network: Arc<StaticNetwork>) -> Result<Session> {
    let session = Session::new("<p>seed</p>", quick_config(), providers(network), fake_factory(probe)).await?;
    session.exec("", true).await?;
    Ok(session)
}

async fn session(probe: &Arc<Probe>) -> Result<Session> {
    session_with(probe, Arc::new(StaticNetwork::default())).await
}

#[test]
fn comment_wrapper_does_not_change_results() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        let plain = session.exec("FAKE_RESULT 3", false).await?;
        let wrapped = session.exec("  <!--\nFAKE_RESULT 3\n-->\n", false).await?;
        assert_eq!(plain, "3");
        assert_eq!(wrapped, plain);
        Ok(())
    })
}

#[test]
fn runaway_script_is_halted_with_sentinel() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        let started = Instant::now();
        let err = session
            .exec("FAKE_SPIN", false)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("spin should not complete"))?;
        assert!(err.is_interrupt(), "expected sentinel, got {err}");
        assert!(err.to_string().contains("halt at"));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The session keeps working after the halt.
        assert_eq!(session.exec("FAKE_RESULT alive", false).await?, "alive");
        Ok(())
    })
}

#[test]
fn script_errors_are_execution_errors() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        let result = session.exec("var a;\nFAKE_THROW ReferenceError: b is not defined", false).await;
        match result {
            Err(SessionError::Execution(err)) => assert!(err.to_string().contains("Line 2:1")),
            other => anyhow::bail!("expected execution error, got {other:?}"),
        }
        Ok(())
    })
}

#[test]
fn noop_script_leaves_document_unchanged() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session = session(&probe).await?;
        session.exec("var x = 1;", false).await?;
        assert_eq!(session.track_changes().await?, None);
        assert!(!probe.evaluated("document.querySelector('html').innerHTML"));
        Ok(())
    })
}

#[test]
fn setting_body_content_is_reported_as_change() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session = session(&probe).await?;
        session.exec("FAKE_SET_BODY <p>new</p>", false).await?;
        assert_eq!(session.track_changes().await?.as_deref(), Some("<p>new</p>"));
        assert_eq!(session.last_output(), "<p>new</p>");

        // Nothing happened since: settled and unchanged.
        assert_eq!(session.track_changes().await?, None);
        assert_eq!(session.last_output(), "<p>new</p>");
        Ok(())
    })
}

#[test]
fn inserted_inline_scripts_run_as_follow_ups() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session = session(&probe).await?;
        session.exec("FAKE_INSERT_SCRIPT FAKE_SET_BODY <b>late</b>", false).await?;
        assert_eq!(session.track_changes().await?.as_deref(), Some("<b>late</b>"));
        assert!(lock(&probe.sources).iter().any(|source| source == "FAKE_SET_BODY <b>late</b>"));
        Ok(())
    })
}

#[test]
fn remote_scripts_are_fetched_before_running() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    let network = Arc::new(StaticNetwork {
        responses: HashMap::from([(String::from("/app.js"), String::from("FAKE_SET_BODY remote"))]),
        ..StaticNetwork::default()
    });
    rt.block_on(async {
        let mut session = session_with(&probe, Arc::clone(&network)).await?;
        session.exec("FAKE_INSERT_REMOTE ./app.js\nFAKE_INSERT_REMOTE missing.js", false).await?;
        assert_eq!(session.track_changes().await?.as_deref(), Some("remote"));
        let requests = lock(&network.requests);
        let uris: Vec<&str> = requests.iter().map(|request| request.uri.as_str()).collect();
        assert_eq!(uris, vec!["/app.js", "/missing.js"]);
        assert!(requests.iter().all(|request| request.method == "GET"));
        Ok(())
    })
}

#[test]
fn failed_follow_ups_do_not_stop_draining() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session = session(&probe).await?;
        session
            .exec("FAKE_INSERT_SCRIPT FAKE_THROW boom\nFAKE_SET_BODY after", false)
            .await?;
        assert_eq!(session.track_changes().await?.as_deref(), Some("after"));
        Ok(())
    })
}

#[test]
fn malformed_paths_never_reach_the_engine() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        let before = probe.source_count();
        let err = session
            .write("/1/innerHTML", "x")
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("write without root marker succeeded"))?;
        assert!(matches!(err, SessionError::Path(_)));
        assert_eq!(session.retrieve("innerHTML").await, "");
        assert!(session.list("/body").await.is_empty());
        assert_eq!(probe.source_count(), before);
        Ok(())
    })
}

#[test]
fn write_then_retrieve_returns_the_value() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        let value = "it's \"quoted\"; alert(1)";
        session.write("/0/2/value", value).await?;
        assert_eq!(session.retrieve("/0/2/value").await, value);
        assert!(probe.evaluated("document.getElementsByTagName('body')[0].children[2].value"));
        Ok(())
    })
}

#[test]
fn list_splits_entries() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        assert_eq!(session.list("/0").await, vec!["0", "1", "id", "click()"]);
        Ok(())
    })
}

#[test]
fn host_object_is_registered_once() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let session = session(&probe).await?;
        session.exec("FAKE_RESULT again", true).await?;
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);
        assert!(probe.evaluated("host.deliver = function"));
        Ok(())
    })
}

#[test]
fn xhr_replies_reach_the_guest_callback() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    let network = Arc::new(StaticNetwork {
        responses: HashMap::from([
            (String::from("/data"), String::from("payload")),
            (String::from("/bad"), String::from("BOOM")),
        ]),
        ..StaticNetwork::default()
    });
    rt.block_on(async {
        let session = session_with(&probe, network).await?;
        assert_eq!(session.exec("FAKE_XHR data", false).await?, "1");
        assert_eq!(session.exec("FAKE_XHR /nowhere", false).await?, "2");
        assert_eq!(session.exec("FAKE_XHR bad", false).await?, "3");

        for _ in 0..200 {
            if lock(&probe.deliveries).len() == 3 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        let mut deliveries = lock(&probe.deliveries).clone();
        deliveries.sort();
        assert_eq!(deliveries.len(), 3);
        assert_eq!(deliveries[0], (String::from("1"), String::from("payload"), String::new()));
        assert_eq!(deliveries[1].0, "2");
        assert!(deliveries[1].2.starts_with("xhrq: 404 /nowhere"));

        // A throwing callback is logged; the session stays usable.
        assert_eq!(session.exec("FAKE_RESULT fine", false).await?, "fine");
        Ok(())
    })
}

#[test]
fn click_tracks_changes_only_when_something_reacted() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session = session(&probe).await?;
        assert_eq!(session.trigger_click("#missing').remove();//").await?, None);
        assert_eq!(session.trigger_click("#go").await?.as_deref(), Some("clicked"));
        assert!(session.put_attr("#go", "value", "1").await?);
        assert!(!session.put_attr("#nope", "value", "1").await?);
        Ok(())
    })
}

#[test]
fn boot_runs_scripts_in_order_and_settles() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session =
            Session::new("", quick_config(), providers(Arc::default()), fake_factory(&probe)).await?;
        let scripts = vec![
            String::from("FAKE_RESULT first"),
            String::from("FAKE_THROW Error: second fails"),
            String::from("FAKE_SET_BODY booted"),
        ];
        assert_eq!(session.boot(&scripts).await?.as_deref(), Some("booted"));
        assert!(probe.evaluated("if (this.document) document.close();"));
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);
        session.stop();
        Ok(())
    })
}

#[test]
fn halted_boot_script_aborts_boot() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    rt.block_on(async {
        let mut session =
            Session::new("", quick_config(), providers(Arc::default()), fake_factory(&probe)).await?;
        let scripts = vec![String::from("FAKE_SPIN"), String::from("FAKE_SET_BODY never")];
        let err = session
            .boot(&scripts)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("boot should abort"))?;
        assert!(err.is_interrupt());
        assert!(!probe.evaluated("FAKE_SET_BODY never"));
        Ok(())
    })
}

#[test]
fn engine_creation_failure_leaves_no_session() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let factory: dom_session::EngineFactory =
        Arc::new(|| -> Result<Box<dyn js::JsEngine>> { anyhow::bail!("no engine today") });
    let result = rt.block_on(Session::new(
        "",
        SessionConfig::default(),
        providers(Arc::default()),
        factory,
    ));
    assert!(matches!(result, Err(SessionError::Configuration(message)) if message.contains("no engine today")));
    Ok(())
}

#[cfg(unix)]
#[test]
fn large_follow_ups_pass_through_the_transpiler() -> Result<()> {
    init_logging();
    let rt = Runtime::new()?;
    let probe = Arc::new(Probe::default());
    let script = format!("FAKE_SET_BODY transpiled\n//{}", "x".repeat(1 << 20));
    let network = Arc::new(StaticNetwork {
        responses: HashMap::from([(String::from("/big.js"), script)]),
        ..StaticNetwork::default()
    });
    let config = SessionConfig {
        transpiler: Some(String::from("cat")),
        ..SessionConfig::new(5_000, 100)
    };
    rt.block_on(async {
        let mut session =
            Session::new("", config, providers(network), fake_factory(&probe)).await?;
        session.exec("", true).await?;
        session.exec("FAKE_INSERT_REMOTE /big.js", false).await?;
        let tracked = tokio::time::timeout(Duration::from_secs(20), session.track_changes()).await?;
        assert_eq!(tracked?.as_deref(), Some("transpiled"));
        Ok(())
    })
}
