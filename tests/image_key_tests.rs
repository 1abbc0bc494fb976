//! Image naming and content-type rules as seen from outside the crate
use rstest::rstest;
use xkcd_sync_lib::domain::{extract_image_file_name, image_key};
use xkcd_sync_lib::infrastructure::{ContentTypeDetector, is_valid_image_content_type};

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

#[rstest]
#[case("https://imgs.xkcd.com/comics/woodpecker.png", Some("woodpecker.png"))]
#[case("https://imgs.xkcd.com/comics//barrel_cropped_(1).jpg", Some("barrel_cropped_(1).jpg"))]
#[case("https://example.com/static/a/b.gif", Some("b.gif"))]
#[case("https://example.com/static/", None)]
#[case("   ", None)]
fn image_file_names(#[case] url: &str, #[case] expected: Option<&str>) {
    assert_eq!(extract_image_file_name(url).as_deref(), expected);
}

#[test]
fn image_keys_are_prefixed_comic_numbers() {
    assert_eq!(image_key(1), "xkcd/1");
    assert_eq!(image_key(2950), "xkcd/2950");
}

#[test]
fn sniffed_png_beats_misleading_name() {
    let detector = ContentTypeDetector::new();
    assert_eq!(detector.detect(PNG_HEADER, None, "comic.jpg"), "image/png");
}

#[test]
fn provided_image_type_is_trusted() {
    let detector = ContentTypeDetector::new();
    assert_eq!(detector.detect(b"opaque", Some("image/webp"), "comic.bin"), "image/webp");
}

#[test]
fn unknown_bytes_fall_back_to_extension_then_octet_stream() {
    let detector = ContentTypeDetector::new();
    assert_eq!(detector.detect(b"opaque", Some("application/octet-stream"), "comic.gif"), "image/gif");
    assert_eq!(detector.detect(b"opaque", None, "comic.txt"), "application/octet-stream");
    assert!(!detector.is_image(b"<html></html>"));
}

#[rstest]
#[case("image/png", true)]
#[case(" image/jpeg ", true)]
#[case("application/octet-stream", false)]
#[case("text/html", false)]
#[case("", false)]
fn image_content_type_validity(#[case] content_type: &str, #[case] expected: bool) {
    assert_eq!(is_valid_image_content_type(content_type), expected);
}
