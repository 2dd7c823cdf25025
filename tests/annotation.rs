use image::{GrayImage, Luma, Rgb, RgbImage};
use simulant_compositor::annotation::{generate_annotation, valid_masks, write_annotations, write_valid_list, TRAIN_LIST};
use simulant_compositor::CompositeError;
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("simulant_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 100x50 mask with a block on rows 10..20 and columns 5..15.
fn block() -> GrayImage {
    GrayImage::from_fn(100, 50, |x, y| {
        Luma([if (5..15).contains(&x) && (10..20).contains(&y) { 255 } else { 0 }])
    })
}

#[test]
fn block_mask_gets_a_normalised_box() {
    let dir = scratch("annotate_block");
    let path = dir.join("0001.png");
    block().save(&path).unwrap();

    let annotation = generate_annotation(&path).unwrap();
    assert_eq!(annotation.file_info.filename, "0001.png");
    assert_eq!((annotation.file_info.width, annotation.file_info.height), (100, 50));
    let bbox = annotation.annotations.person;
    assert!((bbox.x - 5.0 / 99.0).abs() < 1e-12);
    assert!((bbox.y - 10.0 / 49.0).abs() < 1e-12);
    assert!((bbox.width - 9.0 / 99.0).abs() < 1e-12);
    assert!((bbox.height - 9.0 / 49.0).abs() < 1e-12);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn annotations_are_written_per_mask() {
    let masks = scratch("annotate_in");
    let out = scratch("annotate_out");
    block().save(masks.join("a.png")).unwrap();
    GrayImage::new(20, 20).save(masks.join("b.png")).unwrap();

    assert_eq!(write_annotations(&masks, &out).unwrap(), 2);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("a.json")).unwrap()).unwrap();
    assert_eq!(json["file_info"]["filename"], "a.png");
    assert!(json["annotations"]["person"]["width"].as_f64().unwrap() > 0.0);
    assert!(out.join("b.json").exists());
    let _ = std::fs::remove_dir_all(&masks);
    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn only_nonempty_masks_are_listed() {
    let masks = scratch("valid_in");
    let out = scratch("valid_out");
    block().save(masks.join("person.png")).unwrap();
    GrayImage::new(8, 8).save(masks.join("empty.png")).unwrap();

    assert_eq!(valid_masks(&masks).unwrap(), vec!["person".to_string()]);
    let list = write_valid_list(&masks, &out).unwrap();
    assert_eq!(list, out.join(TRAIN_LIST));
    assert_eq!(std::fs::read_to_string(&list).unwrap(), "person\n");
    let _ = std::fs::remove_dir_all(&masks);
    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn color_masks_are_rejected() {
    let dir = scratch("annotate_rgb");
    let path = dir.join("rgb.png");
    RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])).save(&path).unwrap();

    match generate_annotation(&path) {
        Err(CompositeError::ChannelCount { expected, actual, .. }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 3);
        }
        other => panic!("expected a channel count error, got {other:?}"),
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_mask_is_reported() {
    let err = generate_annotation(std::path::Path::new("/nonexistent/mask.png")).unwrap_err();
    assert!(matches!(err, CompositeError::MissingFile(_)));
}
