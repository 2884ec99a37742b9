// Integration tests for the realtime session manager
//
// These drive the real session task against the in-process loopback
// transport. The clock is paused so backoff and channel deadlines run
// instantly and deterministically.

mod common;

use anyhow::Result;
use common::{settle, Harness};
use realtime_session::session::{
    CONNECTION_LOST_NOTICE, GAVE_UP_NOTICE, RECONNECTED_NOTICE, REMOTE_ERROR_PREFIX,
};
use realtime_session::transport::wav::WavDevices;
use realtime_session::transport::{ConnectivitySignal, IceState, PeerState};
use realtime_session::{
    DisconnectOptions, EntryStatus, MediaError, Role, SessionError, SessionParameters,
    SessionState,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn drain<T: Clone + Send + 'static>(sub: &mut realtime_session::Subscription<T>) -> Vec<T> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_opens_session_and_sends_instructions() -> Result<()> {
    let h = Harness::new();
    assert_eq!(h.manager.state(), SessionState::Idle);

    h.manager
        .connect(SessionParameters::new().with_instructions("Answer in one sentence."))
        .await?;

    assert_eq!(h.manager.state(), SessionState::Listening);
    assert_eq!(h.loopback.sent_kinds(), vec!["session.update"]);
    assert!(h.loopback.sent()[0].contains("Answer in one sentence."));
    assert_eq!(h.loopback.tracks().len(), 1);
    assert_eq!(h.signaling.exchanges(), 1);
    assert_eq!(h.devices.live_sources(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_connect_uses_default_instructions_when_blank() -> Result<()> {
    let h = Harness::new();
    h.manager
        .connect(SessionParameters::new().with_instructions("   "))
        .await?;

    assert!(h.loopback.sent()[0].contains("You are a helpful assistant."));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hello_turn_builds_transcript() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    let mut states = h.manager.subscribe_state();

    h.hello_turn().await;

    let transcript = h.manager.snapshot_transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[0].text, "hello");
    assert_eq!(transcript[0].status, EntryStatus::Final);
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].text, "Hi there");
    assert_eq!(transcript[1].status, EntryStatus::Final);

    assert_eq!(
        drain(&mut states),
        vec![
            SessionState::Listening,
            SessionState::Thinking,
            SessionState::Responding,
            SessionState::Listening,
        ]
    );

    // One response per completed user turn
    assert_eq!(h.loopback.sent_kinds(), vec!["session.update", "response.create"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_completed_without_text_falls_back_to_deltas() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.server(json!({"type": "input_audio_buffer.speech_started"})).await;
    h.server(json!({"type": "conversation.item.input_audio_transcription.delta", "delta": " what time "}))
        .await;
    h.server(json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "is it "}))
        .await;
    h.server(json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": ""}))
        .await;

    assert_eq!(h.texts(), vec!["what time is it"]);
    assert_eq!(h.manager.state(), SessionState::Thinking);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_interrupts_and_cancels() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.server(json!({"type": "input_audio_buffer.speech_started"})).await;
    h.server(json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": "explain rust"}))
        .await;
    h.server(json!({"type": "response.text.delta", "delta": "Let me explain"})).await;
    assert_eq!(h.manager.state(), SessionState::Responding);

    h.server(json!({"type": "input_audio_buffer.speech_started"})).await;

    let transcript = h.manager.snapshot_transcript();
    assert_eq!(transcript[1].text, "Let me explain (interrupted)");
    assert_eq!(transcript[1].status, EntryStatus::Interrupted);
    assert_eq!(transcript[2].role, Role::User);
    assert!(transcript[2].is_draft());
    assert_eq!(h.manager.state(), SessionState::Listening);
    assert_eq!(
        h.loopback.sent_kinds(),
        vec!["session.update", "response.create", "response.cancel"]
    );

    // Output of the cancelled response that was already in flight
    h.server(json!({"type": "response.text.delta", "delta": " ownership"})).await;
    h.server(json!({"type": "response.text.done"})).await;

    assert_eq!(h.manager.snapshot_transcript().len(), 3);
    assert_eq!(h.manager.state(), SessionState::Listening);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_speech_without_response_does_not_cancel() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.hello_turn().await;
    h.server(json!({"type": "input_audio_buffer.speech_started"})).await;

    assert!(!h.loopback.sent_kinds().contains(&"response.cancel".to_string()));
    assert!(!h.texts().iter().any(|t| t.contains("(interrupted)")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_remote_error_appends_notice() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.server(json!({
        "type": "error",
        "error": {"type": "invalid_request_error", "message": "Conversation already has an active response"}
    }))
    .await;

    let last = h.texts().pop().unwrap_or_default();
    assert_eq!(
        last,
        format!("{}Conversation already has an active response", REMOTE_ERROR_PREFIX)
    );
    assert_eq!(h.manager.state(), SessionState::Error);

    let diagnostics = h.manager.diagnostics().snapshot();
    let error = diagnostics.iter().rev().find(|e| e.kind == "error").map(|e| e.raw.is_some());
    assert_eq!(error, Some(true));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_malformed_messages_are_harmless() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    let before = h.manager.snapshot_transcript();

    h.server(json!({"type": "rate_limits.updated", "rate_limits": []})).await;
    assert!(h.loopback.emit(realtime_session::transport::TransportEvent::ChannelMessage(
        "not json".to_string()
    )));
    settle().await;

    assert_eq!(h.manager.snapshot_transcript(), before);
    assert_eq!(h.manager.state(), SessionState::Listening);
    assert!(h
        .manager
        .diagnostics()
        .snapshot()
        .iter()
        .any(|e| e.kind == "rate_limits.updated"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connectivity_signals_emit_once() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    let mut states = h.manager.subscribe_state();

    h.loopback.signal(ConnectivitySignal::Ice(IceState::Connected));
    h.loopback.signal(ConnectivitySignal::Ice(IceState::Completed));
    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Connected));
    settle().await;

    assert_eq!(drain(&mut states), vec![SessionState::Listening]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recovery_preserves_transcript() -> Result<()> {
    let h = Harness::new();
    h.manager
        .connect(
            SessionParameters::new()
                .with_device("usb-mic")
                .with_instructions("Stay terse."),
        )
        .await?;
    h.hello_turn().await;
    let history = h.manager.snapshot_transcript();

    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Failed));
    settle().await;

    assert_eq!(h.manager.state(), SessionState::Reconnecting);
    assert_eq!(h.loopback.open_peers(), 0);
    assert_eq!(h.devices.live_sources(), 0);
    assert_eq!(h.texts().last().map(String::as_str), Some(CONNECTION_LOST_NOTICE));

    // First backoff step is 250ms
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.manager.state(), SessionState::Listening);
    assert_eq!(h.loopback.peers_created(), 2);
    assert_eq!(h.loopback.open_peers(), 1);
    assert_eq!(h.loopback.tracks()[0].label, "usb-mic");
    assert!(h.loopback.sent()[0].contains("Stay terse."));

    let transcript = h.manager.snapshot_transcript();
    assert_eq!(&transcript[..history.len()], &history[..]);
    assert_eq!(transcript[history.len()].text, CONNECTION_LOST_NOTICE);
    assert_eq!(transcript[history.len() + 1].text, RECONNECTED_NOTICE);
    assert_eq!(transcript.len(), history.len() + 2);

    // The new connection carries on the conversation
    h.hello_turn().await;
    assert_eq!(h.manager.snapshot_transcript().len(), history.len() + 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_failure_signals_start_one_recovery() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.loopback.signal(ConnectivitySignal::Ice(IceState::Disconnected));
    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Failed));
    h.loopback.signal(ConnectivitySignal::Ice(IceState::Failed));
    settle().await;

    assert_eq!(h.count_text(CONNECTION_LOST_NOTICE), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.loopback.peers_created(), 2);
    assert_eq!(h.count_text(RECONNECTED_NOTICE), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_recovery_gives_up_once() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    h.loopback.set_open_failure(Some("network unreachable"));

    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Failed));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.count_text(CONNECTION_LOST_NOTICE), 1);
    assert_eq!(h.count_text(GAVE_UP_NOTICE), 1);
    assert_eq!(h.manager.state(), SessionState::Disconnected);
    // Five attempts, none of which got as far as opening a peer
    assert_eq!(h.loopback.peers_created(), 1);
    assert_eq!(h.devices.live_sources(), 0);
    let failures = h
        .manager
        .diagnostics()
        .snapshot()
        .iter()
        .filter(|e| e.kind == "recovery.failed")
        .count();
    assert_eq!(failures, 5);

    // A later connection may recover again
    h.loopback.set_open_failure(None);
    h.manager.connect(SessionParameters::new()).await?;
    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Failed));
    settle().await;

    assert_eq!(h.manager.state(), SessionState::Reconnecting);
    assert_eq!(h.count_text(CONNECTION_LOST_NOTICE), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_recovery() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;

    h.loopback.signal(ConnectivitySignal::Peer(PeerState::Failed));
    settle().await;
    h.manager.disconnect(DisconnectOptions::default()).await?;

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.manager.state(), SessionState::Disconnected);
    assert_eq!(h.loopback.peers_created(), 1);
    assert_eq!(h.count_text(GAVE_UP_NOTICE), 0);
    assert_eq!(h.count_text(RECONNECTED_NOTICE), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_releases_resources() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    h.hello_turn().await;

    h.manager.disconnect(DisconnectOptions::default()).await?;
    assert_eq!(h.manager.state(), SessionState::Disconnected);
    assert_eq!(h.loopback.open_peers(), 0);
    assert_eq!(h.devices.live_sources(), 0);
    assert_eq!(h.manager.snapshot_transcript().len(), 2);

    // Second disconnect is a no-op
    h.manager.disconnect(DisconnectOptions::default()).await?;
    assert_eq!(h.manager.state(), SessionState::Disconnected);

    h.manager
        .disconnect(DisconnectOptions {
            clear_transcript: true,
        })
        .await?;
    assert!(h.manager.snapshot_transcript().is_empty());
    assert_eq!(h.manager.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_events_after_disconnect_are_ignored() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    h.manager.disconnect(DisconnectOptions::default()).await?;

    // No open peer remains to carry anything
    assert!(!h.loopback.server_event(json!({"type": "response.text.delta", "delta": "late"})));
    settle().await;
    assert!(h.manager.snapshot_transcript().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_newer_connect_supersedes_pending_one() -> Result<()> {
    let h = Harness::new();
    h.loopback.set_auto_open_channel(false);

    let manager = h.manager.clone();
    let first = tokio::spawn(async move {
        manager
            .connect(SessionParameters::new().with_instructions("first"))
            .await
    });
    settle().await;
    assert_eq!(h.manager.state(), SessionState::Connecting);

    h.loopback.set_auto_open_channel(true);
    h.manager
        .connect(SessionParameters::new().with_instructions("second"))
        .await?;

    assert!(matches!(first.await?, Err(SessionError::Superseded)));
    assert_eq!(h.manager.state(), SessionState::Listening);
    assert!(h.loopback.sent()[0].contains("second"));

    // The abandoned attempt gives up on its channel and is discarded
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(h.loopback.open_peers(), 1);
    assert_eq!(h.manager.state(), SessionState::Listening);
    assert!(h
        .manager
        .diagnostics()
        .snapshot()
        .iter()
        .any(|e| e.kind == "attempt.stale"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_supersedes_pending_connect() -> Result<()> {
    let h = Harness::new();
    h.loopback.set_auto_open_channel(false);

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.connect(SessionParameters::new()).await });
    settle().await;

    h.manager.disconnect(DisconnectOptions::default()).await?;
    assert!(matches!(pending.await?, Err(SessionError::Superseded)));

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(h.manager.state(), SessionState::Disconnected);
    assert_eq!(h.loopback.open_peers(), 0);
    assert_eq!(h.devices.live_sources(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_channel_open_timeout() -> Result<()> {
    let h = Harness::new();
    h.loopback.set_auto_open_channel(false);

    let result = h.manager.connect(SessionParameters::new()).await;

    assert!(matches!(result, Err(SessionError::ChannelTimeout(_))));
    assert_eq!(h.manager.state(), SessionState::Error);
    assert_eq!(h.loopback.open_peers(), 0);
    assert_eq!(h.devices.live_sources(), 0);
    assert!(h.loopback.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_media_permission_denied() -> Result<()> {
    let h = Harness::new();
    h.devices.set_deny_permission(true);

    let result = h.manager.connect(SessionParameters::new()).await;

    assert!(matches!(
        result,
        Err(SessionError::MediaAcquisition(MediaError::PermissionDenied))
    ));
    assert_eq!(h.manager.state(), SessionState::Error);
    assert_eq!(h.loopback.peers_created(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_device_is_unavailable() -> Result<()> {
    let h = Harness::new();
    let result = h
        .manager
        .connect(SessionParameters::new().with_device("headset"))
        .await;

    assert!(matches!(
        result,
        Err(SessionError::MediaAcquisition(MediaError::DeviceUnavailable(d))) if d == "headset"
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_signaling_rejection_releases_everything() -> Result<()> {
    let h = Harness::new();
    h.signaling.set_failure(Some((400, "invalid offer")));

    let result = h.manager.connect(SessionParameters::new()).await;

    match result {
        Err(SessionError::Signaling { status, body }) => {
            assert_eq!(status, Some(400));
            assert_eq!(body, "invalid offer");
        }
        other => panic!("expected signaling error, got {:?}", other),
    }
    assert_eq!(h.loopback.peers_created(), 1);
    assert_eq!(h.loopback.open_peers(), 0);
    assert_eq!(h.devices.live_sources(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_can_be_retried() -> Result<()> {
    let h = Harness::new();
    h.loopback.set_open_failure(Some("no network"));

    let result = h.manager.connect(SessionParameters::new()).await;
    assert!(matches!(result, Err(SessionError::Signaling { status: None, .. })));
    assert_eq!(h.devices.live_sources(), 0);

    h.loopback.set_open_failure(None);
    h.manager.connect(SessionParameters::new()).await?;
    assert_eq!(h.manager.state(), SessionState::Listening);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_live_session() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    h.hello_turn().await;

    h.manager.connect(SessionParameters::new()).await?;

    assert_eq!(h.loopback.peers_created(), 2);
    assert_eq!(h.loopback.open_peers(), 1);
    assert_eq!(h.devices.live_sources(), 1);
    // Transcript survives a caller reconnect
    assert_eq!(h.manager.snapshot_transcript().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_releases_transport() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    let loopback = h.loopback.clone();
    let devices = h.devices.clone();

    drop(h);
    settle().await;

    assert_eq!(loopback.open_peers(), 0);
    assert_eq!(devices.live_sources(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_diagnostics_can_be_disabled_and_cleared() -> Result<()> {
    let h = Harness::new();
    h.manager.connect(SessionParameters::new()).await?;
    assert!(!h.manager.diagnostics().snapshot().is_empty());

    h.manager.clear_diagnostics();
    h.manager.set_diagnostics_enabled(false);
    h.hello_turn().await;
    assert!(h.manager.diagnostics().snapshot().is_empty());

    h.manager.set_diagnostics_enabled(true);
    h.server(json!({"type": "input_audio_buffer.speech_started"})).await;
    let kinds: Vec<String> = h
        .manager
        .diagnostics()
        .snapshot()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&"input_audio_buffer.speech_started".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wav_device_backs_audio_track() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(temp_dir.path().join("desk.wav"), spec)?;
    for i in 0..16000 {
        writer.write_sample((i % 64) as i16)?;
    }
    writer.finalize()?;

    let h = Harness::with_media(Arc::new(WavDevices::new(temp_dir.path(), "desk")));
    h.manager.connect(SessionParameters::new()).await?;

    let tracks = h.loopback.tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].sample_rate, 16000);
    assert!(tracks[0].label.ends_with("desk.wav"));

    let missing = h
        .manager
        .connect(SessionParameters::new().with_device("absent"))
        .await;
    assert!(matches!(
        missing,
        Err(SessionError::MediaAcquisition(MediaError::DeviceUnavailable(_)))
    ));
    Ok(())
}
