use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> TimerCallback) {
    let c = Arc::new(AtomicUsize::new(0));
    let c2 = Arc::clone(&c);
    (c, move || {
        let c = Arc::clone(&c2);
        Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }) as TimerCallback
    })
}

#[test]
fn manual_timers_fire_only_when_due() {
    let s = ManualScheduler::new();
    let (count, make) = counter();
    s.set_timeout(Duration::from_millis(500), make());

    assert_eq!(s.advance(Duration::from_millis(499)), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(s.advance(Duration::from_millis(1)), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(s.advance(Duration::from_secs(5)), 0);
    assert_eq!(s.pending_timers(), 0);
}

#[test]
fn manual_timers_see_their_due_time() {
    let s = Arc::new(ManualScheduler::new());
    let (tx, rx) = mpsc::channel();
    let s2 = Arc::clone(&s);
    s.set_timeout(
        Duration::from_millis(100),
        Box::new(move || {
            let _ = tx.send(s2.elapsed());
        }),
    );
    s.advance(Duration::from_secs(1));
    assert_eq!(rx.try_recv().unwrap(), Duration::from_millis(100));
    assert_eq!(s.elapsed(), Duration::from_secs(1));
}

#[test]
fn cleared_timer_never_fires() {
    let s = ManualScheduler::new();
    let (count, make) = counter();
    let id = s.set_timeout(Duration::from_millis(10), make());
    s.clear_timeout(id);
    s.clear_timeout(id);
    s.advance(Duration::from_secs(1));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn frames_requested_during_dispatch_run_next_frame() {
    let s = Arc::new(ManualScheduler::new());
    let ran = Arc::new(AtomicUsize::new(0));

    let s2 = Arc::clone(&s);
    let ran2 = Arc::clone(&ran);
    s.request_frame(Box::new(move |_| {
        ran2.fetch_add(1, Ordering::SeqCst);
        let ran3 = Arc::clone(&ran2);
        s2.request_frame(Box::new(move |_| {
            ran3.fetch_add(1, Ordering::SeqCst);
        }));
    }));

    assert_eq!(s.run_frame(), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(s.pending_frames(), 1);
    assert_eq!(s.run_frame(), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(s.run_frame(), 0);
}

#[test]
fn cancelled_frame_does_not_run() {
    let s = ManualScheduler::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = Arc::clone(&ran);
    let id = s.request_frame(Box::new(move |_| {
        ran2.fetch_add(1, Ordering::SeqCst);
    }));
    s.cancel_frame(id);
    assert_eq!(s.run_frame(), 0);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn frame_callbacks_receive_scheduler_time() {
    let s = ManualScheduler::new();
    let (tx, rx) = mpsc::channel();
    s.request_frame(Box::new(move |now| {
        let _ = tx.send(now);
    }));
    s.step(Duration::from_millis(40));
    assert_eq!(rx.try_recv().unwrap(), s.now());
}

#[test]
fn interval_scheduler_runs_frames_and_timers() {
    let s = IntervalScheduler::new(120).unwrap();
    let (tx, rx) = mpsc::channel();
    let tx2 = tx.clone();
    s.request_frame(Box::new(move |_| {
        let _ = tx.send("frame");
    }));
    s.set_timeout(
        Duration::from_millis(20),
        Box::new(move || {
            let _ = tx2.send("timer");
        }),
    );

    let mut seen = vec![
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
    ];
    seen.sort_unstable();
    assert_eq!(seen, vec!["frame", "timer"]);
}

#[test]
fn interval_scheduler_rejects_zero_rate() {
    assert!(IntervalScheduler::new(0).is_err());
}
