mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use shared::capabilities::{Notice, PermissionKind, PermissionStatus};
use shared::{Activation, DispatchChannel, SosState};
use support::{Harness, Options};
use tokio::time::Instant;

const COOLDOWN: Duration = Duration::from_millis(30_000);

fn started(activation: Activation) -> (shared::SessionId, tokio::task::JoinHandle<()>) {
    match activation {
        Activation::Started {
            session_id,
            pipeline,
        } => (session_id, pipeline),
        Activation::Suppressed { state } => panic!("expected a new session, got {state}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rapid_activations_send_one_alert() {
    let h = Harness::new(Options::default()).await;

    let (_, pipeline) = started(h.controller().activate());
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            h.controller().activate(),
            Activation::Suppressed { .. }
        ));
    }
    pipeline.await.unwrap();

    assert_eq!(h.transport.calls_to("/alerts/sos").len(), 1);
    assert_eq!(h.controller().state(), SosState::CoolingDown);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_resets_while_dispatch_still_hangs() {
    let h = Harness::new(Options {
        relay_timeout: Duration::from_secs(120),
        ..Options::default()
    })
    .await;
    h.transport.hang_sos.store(true, Ordering::SeqCst);

    let start = Instant::now();
    let (first, _pipeline) = started(h.controller().activate());
    h.wait_for(SosState::Dispatching).await;

    tokio::time::sleep_until(start + COOLDOWN - Duration::from_millis(1)).await;
    assert_eq!(h.controller().state(), SosState::Dispatching);

    tokio::time::sleep_until(start + COOLDOWN + Duration::from_millis(1)).await;
    assert_eq!(h.controller().state(), SosState::Idle);
    assert!(h.notices().is_empty());

    // The stale pipeline cannot touch the next session.
    h.transport.hang_sos.store(false, Ordering::SeqCst);
    let (second, pipeline) = started(h.controller().activate());
    assert_ne!(first, second);
    pipeline.await.unwrap();
    assert_eq!(h.controller().session().unwrap().id, second);
    assert_eq!(h.controller().state(), SosState::CoolingDown);
}

#[tokio::test(start_paused = true)]
async fn test_microphone_denied_still_dispatches_without_audio() {
    let h = Harness::new(Options {
        microphone: PermissionStatus::Denied,
        ..Options::default()
    })
    .await;

    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    let sos = h.transport.calls_to("/alerts/sos");
    assert_eq!(sos.len(), 1);
    let body = sos[0].json.as_ref().unwrap();
    assert!(body.get("audioUrl").is_none());
    assert!(body.get("lat").is_some());
    assert!(h.transport.calls_to("/alerts/sos-audio").is_empty());
    assert_eq!(h.fallback.starts.load(Ordering::SeqCst), 0);

    let notices = h.notices();
    assert!(notices.iter().any(|n| matches!(
        n,
        Notice::PermissionRequired {
            kind: PermissionKind::Microphone,
            ..
        }
    )));
    assert!(notices.contains(&Notice::SosDispatched {
        channel: DispatchChannel::Backend
    }));
    assert!(h.controller().archive().lock().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fallback_recording_is_uploaded_and_archived() {
    let h = Harness::new(Options::default()).await;

    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    let uploads = h.transport.calls_to("/alerts/sos-audio");
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].multipart_field.as_deref(), Some("audio"));

    let sos = h.transport.calls_to("/alerts/sos");
    let body = sos[0].json.as_ref().unwrap();
    assert_eq!(body["audioUrl"], "https://cdn.example.com/sos.m4a");
    assert_eq!(body["phone"], "919021530516");

    let archive = h.controller().archive();
    let archive = archive.lock().await;
    assert_eq!(archive.len(), 1);
    assert_eq!(
        archive.entries()[0].file_path,
        "file:///recordings/fallback-0.m4a"
    );
    assert!(archive.entries()[0].location.is_some());

    let view = h.controller().status_view().await.unwrap();
    assert!(view.is_sos_active);
    assert!(!view.is_recording);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_still_sends_alert() {
    let h = Harness::new(Options::default()).await;
    h.transport.fail_upload.store(true, Ordering::SeqCst);

    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    let sos = h.transport.calls_to("/alerts/sos");
    assert_eq!(sos.len(), 1);
    assert!(sos[0].json.as_ref().unwrap().get("audioUrl").is_none());
    let report = h.controller().session().unwrap().dispatch_result.unwrap();
    assert_eq!(report.delivered_via(), Some(DispatchChannel::Backend));
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_while_dispatching_archives_native_capture() {
    let h = Harness::new(Options {
        native_recorder: true,
        relay_timeout: Duration::from_secs(120),
        ..Options::default()
    })
    .await;
    h.transport.hang_sos.store(true, Ordering::SeqCst);

    started(h.controller().activate());
    h.wait_for(SosState::Dispatching).await;
    assert!(h.controller().status_view().await.unwrap().is_recording);

    assert!(h.controller().stop().await);
    assert_eq!(h.controller().state(), SosState::Idle);

    let native = h.native.as_ref().unwrap();
    assert_eq!(native.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.fallback.starts.load(Ordering::SeqCst), 0);
    let archive = h.controller().archive();
    assert_eq!(
        archive.lock().await.entries()[0].file_path,
        "file:///recordings/native-0.m4a"
    );

    // Cooldown was cancelled with the session.
    tokio::time::sleep(COOLDOWN * 2).await;
    assert_eq!(native.stops.load(Ordering::SeqCst), 1);
    assert!(!h.controller().stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_native_capture_outlives_dispatch_until_cooldown() {
    let h = Harness::new(Options {
        native_recorder: true,
        ..Options::default()
    })
    .await;

    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    let native = h.native.as_ref().unwrap();
    assert!(h.transport.calls_to("/alerts/sos-audio").is_empty());
    assert_eq!(native.stops.load(Ordering::SeqCst), 0);
    assert!(!h.controller().stop().await, "stop is ignored while cooling down");

    tokio::time::sleep(COOLDOWN).await;
    h.wait_for(SosState::Idle).await;
    tokio::task::yield_now().await;

    assert_eq!(native.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller().archive().lock().await.len(), 1);
    assert!(h.controller().status_view().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_follows_session() {
    let h = Harness::new(Options::default()).await;
    let mut rx = h.controller().subscribe();
    assert_eq!(rx.borrow().state, SosState::Idle);

    let (id, _) = started(h.controller().activate());
    let cooling = *rx
        .wait_for(|s| s.state == SosState::CoolingDown)
        .await
        .unwrap();
    assert_eq!(cooling.session_id, Some(id));

    let idle = *rx.wait_for(|s| s.state == SosState::Idle).await.unwrap();
    assert_eq!(idle.session_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_falls_back_to_chat_app() {
    let h = Harness::new(Options::default()).await;
    h.transport.fail_sos.store(true, Ordering::SeqCst);

    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    assert_eq!(h.opener.opened_schemes(), vec!["whatsapp"]);
    assert!(h.notices().contains(&Notice::SosDispatched {
        channel: DispatchChannel::ChatApp
    }));
    assert_eq!(h.controller().state(), SosState::CoolingDown);
}

#[tokio::test(start_paused = true)]
async fn test_triple_tap_starts_one_session() {
    let mut h = Harness::new(Options::default()).await;
    let listener = h.app.listen_for_triggers().unwrap();
    assert!(h.app.listen_for_triggers().is_none());

    let t0 = std::time::Instant::now();
    assert!(!h.app.trigger().tap(t0));
    assert!(!h.app.trigger().tap(t0 + Duration::from_millis(200)));
    assert!(h.app.trigger().tap(t0 + Duration::from_millis(400)));

    h.wait_for(SosState::CoolingDown).await;
    assert_eq!(h.transport.calls_to("/alerts/sos").len(), 1);

    h.app.shutdown();
    listener.abort();
}

#[tokio::test(start_paused = true)]
async fn test_held_archive_does_not_delay_alert() {
    let h = Harness::new(Options::default()).await;
    let archive = h.controller().archive();
    let playback = archive.lock().await;

    let (_, pipeline) = started(h.controller().activate());
    h.wait_for(SosState::CoolingDown).await;

    assert_eq!(h.transport.calls_to("/alerts/sos").len(), 1);
    assert!(h.notices().contains(&Notice::SosDispatched {
        channel: DispatchChannel::Backend
    }));

    drop(playback);
    pipeline.await.unwrap();
    assert_eq!(archive.lock().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_location_prompt_still_dispatches() {
    let h = Harness::new(Options {
        location: PermissionStatus::NotDetermined,
        ..Options::default()
    })
    .await;
    h.permissions.leave_unanswered(PermissionKind::Location);

    let start = Instant::now();
    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    assert!(start.elapsed() < COOLDOWN);
    let sos = h.transport.calls_to("/alerts/sos");
    assert_eq!(sos.len(), 1);
    assert!(sos[0].json.as_ref().unwrap().get("lat").is_none());
    assert!(sos[0].json.as_ref().unwrap().get("audioUrl").is_some());
    assert_eq!(h.controller().state(), SosState::CoolingDown);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_microphone_prompt_counts_as_denied() {
    let h = Harness::new(Options {
        microphone: PermissionStatus::NotDetermined,
        ..Options::default()
    })
    .await;
    h.permissions.leave_unanswered(PermissionKind::Microphone);

    let start = Instant::now();
    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(5_000));
    assert!(start.elapsed() < COOLDOWN);
    assert_eq!(h.transport.calls_to("/alerts/sos").len(), 1);
    assert!(h.transport.calls_to("/alerts/sos-audio").is_empty());
    assert_eq!(h.fallback.starts.load(Ordering::SeqCst), 0);
    assert!(h.notices().iter().any(|n| matches!(
        n,
        Notice::PermissionRequired {
            kind: PermissionKind::Microphone,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_recorder_start_is_abandoned() {
    let h = Harness::new(Options::default()).await;
    h.fallback.hang_start.store(true, Ordering::SeqCst);

    let start = Instant::now();
    let (_, pipeline) = started(h.controller().activate());
    pipeline.await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(5_000));
    assert!(start.elapsed() < COOLDOWN);
    let sos = h.transport.calls_to("/alerts/sos");
    assert_eq!(sos.len(), 1);
    let body = sos[0].json.as_ref().unwrap();
    assert!(body.get("audioUrl").is_none());
    assert!(body.get("lat").is_some());
    assert!(h.controller().status_view().await.is_some_and(|v| !v.is_recording));
    assert!(h.controller().archive().lock().await.is_empty());
}
