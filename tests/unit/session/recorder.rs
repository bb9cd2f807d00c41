use super::*;
use crate::encode::memory::InMemoryEncoderFactory;
use crate::encode::profile::VideoCodec;
use crate::render::frame::FrameRGBA;
use crate::session::schedule::ManualScheduler;
use crate::surface::SurfaceRegistry;

const WAIT: Duration = Duration::from_secs(5);

fn recorder_with(
    registry: Arc<SurfaceRegistry>,
) -> (Recorder, Arc<ManualScheduler>, Arc<InMemoryEncoderFactory>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let encoders = Arc::new(InMemoryEncoderFactory::new());
    let rec = Recorder::new(
        RecorderOpts::default(),
        registry,
        encoders.clone(),
        scheduler.clone(),
    )
    .unwrap();
    (rec, scheduler, encoders)
}

fn registry_with(sizes: &[(u32, u32)]) -> Arc<SurfaceRegistry> {
    let reg = Arc::new(SurfaceRegistry::new());
    for &(w, h) in sizes {
        let s = PixelSurface::from_frame(
            FrameRGBA::filled(
                Canvas::new(w, h),
                Rgba8Premul::from_straight_rgba(200, 10, 10, 255),
            )
            .unwrap(),
        );
        reg.attach(Arc::new(s));
    }
    reg
}

#[test]
fn default_opts_are_valid() {
    let opts = RecorderOpts::default();
    opts.validate().unwrap();
    assert_eq!(opts.fps, Fps::new(30, 1).unwrap());
    assert_eq!(opts.bitrate_bps, 5_000_000);
    assert_eq!(opts.profiles, default_preferences());
}

#[test]
fn translucent_background_is_rejected() {
    let opts = RecorderOpts {
        background_rgba: [0, 0, 0, 128],
        ..RecorderOpts::default()
    };
    let err = opts.validate().unwrap_err();
    assert!(err.to_string().contains("opaque"));
}

#[test]
fn zero_channel_capacity_is_rejected() {
    let opts = RecorderOpts {
        channel_capacity: 0,
        ..RecorderOpts::default()
    };
    assert!(opts.validate().is_err());
}

#[test]
fn opts_json_fills_missing_fields() {
    let opts: RecorderOpts = serde_json::from_str(
        r#"{ "fps": { "num": 60, "den": 1 }, "profiles": ["video/mp4;codecs=avc1"] }"#,
    )
    .unwrap();
    assert_eq!(opts.fps, Fps::new(60, 1).unwrap());
    assert_eq!(opts.channel_capacity, 8);
    assert_eq!(opts.profiles.len(), 1);
    assert_eq!(opts.profiles[0].codec, Some(VideoCodec::H264));
}

#[test]
fn opts_from_json_path_reports_bad_json() {
    let dir = std::env::temp_dir().join(format!("strata-opts-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = RecorderOpts::from_json_path(&path).unwrap_err();
    assert!(matches!(err, StrataError::Serde(_)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn opts_from_json_path_validates() {
    let dir = std::env::temp_dir().join(format!("strata-opts-v-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("opts.json");
    std::fs::write(&path, r#"{ "background_rgba": [1, 2, 3, 0] }"#).unwrap();
    assert!(matches!(
        RecorderOpts::from_json_path(&path),
        Err(StrataError::Validation(_))
    ));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stop_for_another_session_is_ignored() {
    let (rec, sched, _) = recorder_with(registry_with(&[(8, 6)]));
    let Ok(StartOutcome::Started(id)) = rec.start(Duration::ZERO, |_| {}) else {
        panic!("expected start");
    };
    Shared::stop_session(&rec.shared, Some(SessionId(id.0 + 100)));
    assert!(!rec.session_stats().unwrap().finalizing);
    assert_eq!(sched.pending_frames(), 1);
    rec.stop();
}

#[test]
fn completion_for_another_session_is_ignored() {
    let (rec, _, _) = recorder_with(registry_with(&[(8, 6)]));
    rec.start(Duration::ZERO, |_| panic!("must not run for a foreign completion"))
        .unwrap();
    let id = rec.session_id().unwrap();
    Shared::complete(&rec.shared, SessionId(id.0 + 1), Artifact::default());
    assert!(rec.is_recording());
    // Take the session out without running its callback.
    rec.shared.session.lock().take();
}

#[test]
fn first_tick_runs_inside_start() {
    let (rec, sched, encoders) = recorder_with(registry_with(&[(8, 6), (2, 2)]));
    let handle = rec.start_awaitable(Duration::ZERO).unwrap().unwrap();
    let stats = rec.session_stats().unwrap();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.last_report.drawn, 2);
    assert_eq!(sched.pending_frames(), 1);
    assert_eq!(rec.output_canvas(), Some(Canvas::new(8, 6)));

    rec.stop();
    let artifact = handle.wait_timeout(WAIT).unwrap();
    assert_eq!(artifact.frames_encoded, 1);
    assert_eq!(encoders.frame_count(), 1);
}

#[test]
fn preview_tracks_last_composite() {
    let (rec, _, _) = recorder_with(registry_with(&[(4, 3)]));
    let preview = rec.preview_surface();
    assert_eq!(preview.pixel_size(), Canvas::new(0, 0));
    let handle = rec.start_awaitable(Duration::ZERO).unwrap().unwrap();
    assert_eq!(preview.pixel_size(), Canvas::new(4, 3));
    rec.stop();
    handle.wait_timeout(WAIT).unwrap();
}
