use std::path::{Path, PathBuf};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_retrodither")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "retrodither.exe"
            } else {
                "retrodither"
            });
            p
        })
}

fn write_gradient(path: &Path, w: u32, h: u32, shift: u32) {
    let img = image::RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([
            ((x + shift) * 255 / w) as u8,
            (y * 255 / h) as u8,
            128,
            255,
        ])
    });
    img.save(path).unwrap();
}

fn fresh_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("cli_smoke").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn cli_preview_writes_downscaled_png() {
    let dir = fresh_dir("preview");
    let in_path = dir.join("still.png");
    let out_path = dir.join("preview.png");
    write_gradient(&in_path, 720, 360, 0);

    let status = std::process::Command::new(exe())
        .args(["preview", "--in"])
        .arg(&in_path)
        .arg("--out")
        .arg(&out_path)
        .args(["--algorithm", "ordered", "--mix", "1"])
        .status()
        .unwrap();

    assert!(status.success());
    assert_eq!(image::image_dimensions(&out_path).unwrap(), (360, 180));
}

#[test]
fn cli_render_image_dir_to_png_sequence() {
    let dir = fresh_dir("render");
    let in_dir = dir.join("frames");
    let out_dir = dir.join("out");
    std::fs::create_dir_all(&in_dir).unwrap();
    for i in 0..4 {
        write_gradient(&in_dir.join(format!("f{i:02}.png")), 24, 16, i * 3);
    }

    let status = std::process::Command::new(exe())
        .args(["render", "--in"])
        .arg(&in_dir)
        .arg("--out")
        .arg(&out_dir)
        .args([
            "--backend",
            "cpu",
            "--algorithm",
            "error-diffusion",
            "--pixel-block",
            "2",
            "--fps",
            "12",
        ])
        .status()
        .unwrap();

    assert!(status.success());
    let mut written: Vec<_> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();
    assert_eq!(
        written,
        [
            "frame_000000.png",
            "frame_000001.png",
            "frame_000002.png",
            "frame_000003.png"
        ]
    );
    assert_eq!(
        image::image_dimensions(out_dir.join("frame_000003.png")).unwrap(),
        (24, 16)
    );
}

#[test]
fn cli_rejects_bad_size() {
    let status = std::process::Command::new(exe())
        .args(["render", "--in", "nope", "--out", "nope", "--size", "0x10"])
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success());
}
