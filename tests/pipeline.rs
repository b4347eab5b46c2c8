//! End-to-end: config → dispatch → files on disk, with the real codecs.

use image::{DynamicImage, ImageFormat, RgbImage};
use imgpress::config::{Config, ConfigError};
use imgpress::digest::ContentDigest;
use imgpress::dispatch::{DispatchOptions, Dispatcher};
use imgpress::imaging::{Format, RustBackend, SizeConstraint};
use imgpress::job::{Job, JobError};
use imgpress::naming::OutputKey;
use imgpress::store::{LocalStore, StoreError};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn config_for(root: &Path) -> Config {
    let toml = format!(
        r#"
        [avatars]
        sizes = [{{ square = 40 }}, {{ max_width = 60 }}]
        formats = ["png", "jpeg", "webp"]
        stores = [{{ local = "{}" }}]
        "#,
        root.display()
    );
    Config::from_toml_str(&toml).unwrap()
}

fn dimensions_of(path: &Path) -> (u32, u32) {
    let img = image::open(path).unwrap();
    (img.width(), img.height())
}

fn dispatcher() -> Dispatcher<RustBackend> {
    let options = DispatchOptions {
        workers: Some(2),
        ..DispatchOptions::default()
    };
    Dispatcher::new(RustBackend::new(), options).unwrap()
}

#[test]
fn handler_renders_every_variant_to_disk() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("avatars");
    let config = config_for(&root);
    let handler = config.handler("avatars").unwrap();
    let upload = encoded(80, 160, ImageFormat::Png);
    let digest = ContentDigest::of_bytes(&upload);

    let report = dispatcher().dispatch(handler, &upload[..], None).unwrap();

    assert!(report.is_success(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(report.outcomes.len(), 6);
    assert_eq!(report.source_format, "png");
    assert_eq!(report.source_dimensions, (80, 160));

    for format in [Format::Png, Format::Jpeg, Format::WebP] {
        let square = OutputKey::new(SizeConstraint::square(40), &digest, format);
        assert_eq!(dimensions_of(&root.join(square.to_string())), (40, 40));

        let width = OutputKey::new(SizeConstraint::max_width(60), &digest, format);
        assert_eq!(dimensions_of(&root.join(width.to_string())), (60, 120));
    }

    let leftovers: Vec<_> = std::fs::read_dir(&root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn reprocessing_rewrites_the_same_keys() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("out");
    let config = config_for(&root);
    let handler = config.handler("avatars").unwrap();
    let upload = encoded(100, 50, ImageFormat::Jpeg);
    let dispatcher = dispatcher();

    let first = dispatcher.dispatch(handler, &upload[..], None).unwrap();
    let second = dispatcher.dispatch(handler, &upload[..], None).unwrap();

    let keys = |r: &imgpress::dispatch::DispatchReport| {
        r.stored()
            .map(|(_, s)| s.key.to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 6);
}

#[test]
fn source_within_bounds_is_not_upscaled() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::new(tmp.path());
    let upload = encoded(30, 20, ImageFormat::Png);
    let backend = RustBackend::new();

    let mut job = Job::new(
        &upload[..],
        SizeConstraint::max(500),
        Format::Png,
        &store,
        &backend,
    );
    let stored = job.process().unwrap();

    assert!(!stored.resized);
    assert_eq!(
        dimensions_of(&store.path_for(&stored.key.to_string())),
        (30, 20)
    );
}

#[test]
fn unusable_store_root_reports_backend_unavailable() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let store = LocalStore::new(blocker.join("nested"));
    let upload = encoded(10, 10, ImageFormat::Png);
    let backend = RustBackend::new();

    let mut job = Job::new(
        &upload[..],
        SizeConstraint::square(5),
        Format::WebP,
        &store,
        &backend,
    );
    let err = job.process().unwrap_err();

    assert!(matches!(
        err,
        JobError::Store(StoreError::BackendUnavailable { .. })
    ));
}

#[test]
fn garbage_upload_fails_dispatch() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let handler = config.handler("avatars").unwrap();

    let err = dispatcher()
        .dispatch(handler, &b"definitely not an image"[..], None)
        .unwrap_err();

    assert!(err.to_string().starts_with("failed to decode source image"));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn unknown_size_kind_fails_load_before_any_store_is_touched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("avatars");
    let toml = format!(
        r#"
        [avatars]
        sizes = [{{ max_bubble = 40 }}]
        formats = ["png"]
        stores = [{{ local = "{}" }}]
        "#,
        root.display()
    );

    // The only route from a document to a Dispatcher goes through a loaded
    // Handler, so a failed load leaves nothing to dispatch.
    let err = Config::from_toml_str(&toml).unwrap_err();

    assert!(matches!(&err, ConfigError::InvalidSizeKind(t) if t == "max_bubble"));
    assert!(err.to_string().contains("max_bubble"));
    assert!(!root.exists());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}
