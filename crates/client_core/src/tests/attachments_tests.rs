use super::*;
use std::io::Cursor;

use image::DynamicImage;

fn encoded(format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(3, 2)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode");
    bytes
}

#[tokio::test]
async fn loads_png_with_sniffed_mime_type_and_file_label() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("screenshot.img");
    std::fs::write(&path, encoded(ImageFormat::Png)).expect("write");

    let image = load_image(&path).await.expect("load");

    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.label, "screenshot.img");
    assert_eq!(image.bytes(), encoded(ImageFormat::Png).as_slice());
}

#[tokio::test]
async fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let err = load_image(&dir.path().join("nope.png")).await.unwrap_err();

    assert!(matches!(err, AttachmentError::Read { .. }));
}

#[tokio::test]
async fn garbage_bytes_are_a_decode_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.png");
    std::fs::write(&path, b"definitely not an image").expect("write");

    let err = load_image(&path).await.unwrap_err();

    assert!(matches!(err, AttachmentError::Decode { .. }));
}

#[tokio::test]
async fn truncated_image_is_a_decode_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cut.png");
    let bytes = encoded(ImageFormat::Png);
    std::fs::write(&path, &bytes[..bytes.len() / 2]).expect("write");

    assert!(matches!(
        load_image(&path).await,
        Err(AttachmentError::Decode { .. })
    ));
}

#[tokio::test]
async fn load_images_skips_failures_and_keeps_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("first.png");
    let broken = dir.path().join("broken.jpg");
    let second = dir.path().join("second.jpg");
    std::fs::write(&first, encoded(ImageFormat::Png)).expect("write");
    std::fs::write(&broken, b"\xff\xd8 nope").expect("write");
    std::fs::write(&second, encoded(ImageFormat::Jpeg)).expect("write");
    let missing = dir.path().join("missing.png");

    let images = load_images(&[&first, &broken, &missing, &second]).await;

    let summary: Vec<(&str, &str)> = images
        .iter()
        .map(|image| (image.label.as_str(), image.mime_type.as_str()))
        .collect();
    assert_eq!(
        summary,
        [("first.png", "image/png"), ("second.jpg", "image/jpeg")]
    );
}

#[test]
fn decode_attachment_gives_each_image_its_own_id() {
    let bytes = encoded(ImageFormat::Png);
    let a = decode_attachment("a", bytes.clone()).expect("decode");
    let b = decode_attachment("a", bytes).expect("decode");
    assert_ne!(a.id, b.id);
}
