//! Processing pipeline tests: queue, worker, enhancers and notifications.
//!
//! Tests verify:
//! - Tasks are processed and announced strictly in submission order
//! - The end-to-end flow produces one `processed` event and a bounded thumbnail
//! - A failing or panicking task does not stop the worker
//! - Neither enhancer upscales small images

use serde_json::json;

use portfolio_server::imaging::TextBox;
use portfolio_server::{
    AdvancedEnhancer, Event, FastEnhancer, Task, VisionCapabilities, PROCESSED_EVENT,
};

use super::test_utils::{
    dimensions, with_detector, write_image, FixedDetector, PanickingDetector, TestEnv,
};

fn drain(sub: &mut portfolio_server::Subscription) -> Vec<Event> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

#[test]
fn test_tasks_processed_in_order() {
    let mut env = TestEnv::new();
    let mut sub = env.hub.subscribe();
    let handle = env.worker().spawn(env.take_receiver()).unwrap();

    for name in ["A.png", "B.png", "C.png"] {
        let path = env.upload_path(name);
        write_image(&path, 300, 200);
        assert!(env.queue.enqueue(Task::new(path, "event", name)));
    }
    env.queue.shutdown();
    assert_eq!(handle.join(), 3);

    let names: Vec<_> = drain(&mut sub)
        .into_iter()
        .filter(|e| e.name == PROCESSED_EVENT)
        .map(|e| e.data["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["A.png", "B.png", "C.png"]);
}

#[test]
fn test_end_to_end_single_upload() {
    let mut env = TestEnv::new();
    let mut sub = env.hub.subscribe();
    let handle = env.worker().spawn(env.take_receiver()).unwrap();

    let path = env.upload_path("x.jpg");
    write_image(&path, 1600, 1200);
    env.queue.enqueue(Task::new(&path, "snap", "x.jpg"));
    env.queue.shutdown();
    handle.join();

    let events = drain(&mut sub);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "processed");
    assert_eq!(
        events[0].data,
        json!({
            "kind": "snap",
            "name": "x.jpg",
            "url": "/uploads/x.jpg",
            "thumb": "/uploads/thumbs/x.jpg",
        })
    );

    let thumb = env.layout.thumbs_dir().join("x.jpg");
    let (w, h) = dimensions(&thumb);
    assert!(w <= 400 && h <= 300, "thumbnail {}x{}", w, h);
    assert_eq!((w, h), (400, 300));
}

#[test]
fn test_thumbnail_follows_cropped_source() {
    let mut env = TestEnv::new();
    let handle = env
        .worker_with(with_detector(FixedDetector(vec![TextBox::new(
            100, 100, 400, 100, 95.0,
        )])))
        .spawn(env.take_receiver())
        .unwrap();

    let path = env.upload_path("scan.png");
    write_image(&path, 800, 600);
    // Stale preview from the synchronous path
    write_image(&env.layout.thumb_path(&path), 400, 300);

    env.queue.enqueue(Task::new(&path, "cert", "scan.png"));
    env.queue.shutdown();
    handle.join();

    // 400x100 text region plus 6% padding: 448x112
    assert_eq!(dimensions(&path), (448, 112));
    assert_eq!(dimensions(&env.layout.thumb_path(&path)), (400, 100));
}

#[test]
fn test_bad_tasks_do_not_stop_worker() {
    let mut env = TestEnv::new();
    let mut sub = env.hub.subscribe();
    let handle = env
        .worker_with(with_detector(PanickingDetector))
        .spawn(env.take_receiver())
        .unwrap();

    let empty = env.upload_path("empty.jpg");
    std::fs::write(&empty, b"").unwrap();
    let missing = env.upload_path("missing.png");
    let panics = env.upload_path("panics.png");
    write_image(&panics, 64, 64);
    let good = env.upload_path("good.png");
    write_image(&good, 64, 64);

    for (path, name) in [
        (empty, "empty.jpg"),
        (missing, "missing.png"),
        (panics, "panics.png"),
        (good.clone(), "good.png"),
    ] {
        env.queue.enqueue(Task::new(path, "snap", name));
    }
    env.queue.shutdown();
    assert_eq!(handle.join(), 4);

    let names: Vec<_> = drain(&mut sub)
        .into_iter()
        .map(|e| e.data["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["empty.jpg", "missing.png", "panics.png", "good.png"]);

    assert_eq!(std::fs::read(env.upload_path("empty.jpg")).unwrap().len(), 0);
    assert!(env.layout.thumb_path(&good).exists());
}

#[test]
fn test_enhancers_never_upscale() {
    let env = TestEnv::new();
    let path = env.upload_path("small.png");
    write_image(&path, 120, 90);

    FastEnhancer::default().enhance(&path);
    assert_eq!(dimensions(&path), (120, 90));

    AdvancedEnhancer::new(VisionCapabilities::deep_vision()).enhance(&path);
    assert_eq!(dimensions(&path), (120, 90));
}

#[test]
fn test_fast_enhancer_repeatable_bounds() {
    let env = TestEnv::new();
    let path = env.upload_path("big.jpg");
    write_image(&path, 3000, 1500);

    let enhancer = FastEnhancer::default();
    enhancer.enhance(&path);
    let first = dimensions(&path);
    enhancer.enhance(&path);
    let second = dimensions(&path);

    assert_eq!(first, (2000, 1000));
    assert_eq!(first, second);
}

#[test]
fn test_disabled_capabilities_leave_file_untouched() {
    let env = TestEnv::new();
    let path = env.upload_path("keep.png");
    write_image(&path, 2400, 100);
    let before = std::fs::read(&path).unwrap();

    let report = AdvancedEnhancer::new(VisionCapabilities::none()).enhance(&path);
    assert!(!report.wrote_file());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
