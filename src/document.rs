use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tracing::debug;

use crate::error::PipelineError;

/// Resolution pages are rasterised at; also the OCR resolution hint.
pub const RENDER_DPI: u32 = 300;

/// Decodes an image upload or file into an RGBA page.
pub fn load_image(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::InvalidInput(format!("cannot decode image: {}", err)))?;
    Ok(image.to_rgba8())
}

/// Rasterises every page of a PDF, in document order.
pub fn render_pdf_pages(pdf_bytes: &[u8]) -> Result<Vec<RgbaImage>> {
    let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let input_path = dir.path().join("input.pdf");
    fs::write(&input_path, pdf_bytes).with_context(|| "failed to write temp pdf")?;

    let dpi = RENDER_DPI.to_string();
    let (tool, output) = if command_exists("mutool") {
        let output = Command::new("mutool")
            .args(["draw", "-r", &dpi, "-o"])
            .arg(dir.path().join("page-%04d.png"))
            .arg(&input_path)
            .output()
            .with_context(|| "failed to run mutool")?;
        ("mutool", output)
    } else if command_exists("pdftoppm") {
        let output = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi])
            .arg(&input_path)
            .arg(dir.path().join("page"))
            .output()
            .with_context(|| "failed to run pdftoppm")?;
        ("pdftoppm", output)
    } else {
        return Err(PipelineError::InvalidInput(
            "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)".to_string(),
        )
        .into());
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::InvalidInput(format!("{} failed: {}", tool, stderr.trim())).into());
    }

    let mut paths: Vec<_> = fs::read_dir(dir.path())
        .with_context(|| "failed to read temp pdf directory")?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| is_page_image(path))
        .collect();
    paths.sort_by_key(|path| page_number(path));
    debug!(tool, pages = paths.len(), "rasterised pdf");

    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(&path).with_context(|| "failed to read rendered pdf page")?;
        let page = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode rendered page {}", path.display()))?;
        pages.push(page.to_rgba8());
    }
    if pages.is_empty() {
        return Err(PipelineError::InvalidInput("no pages found in pdf".to_string()).into());
    }
    Ok(pages)
}

fn is_page_image(path: &Path) -> bool {
    let named_page = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("page"));
    let png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    named_page && png
}

/// Page index embedded in a rasteriser's output file name.
fn page_number(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.trim_start_matches(|c: char| !c.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(u32::MAX)
}

fn command_exists(cmd: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| {
        let candidate = dir.join(cmd);
        candidate.is_file() && is_executable(&candidate)
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn undecodable_bytes_are_input_errors() {
        let err = load_image(b"definitely not an image").unwrap_err();
        let err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(err.is_input_error());
    }

    #[test]
    fn decodes_png_into_rgba() {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let page = load_image(&bytes).unwrap();
        assert_eq!(page.dimensions(), (3, 2));
    }

    #[test]
    fn page_files_sort_numerically() {
        let mut paths = vec![
            PathBuf::from("/t/page-10.png"),
            PathBuf::from("/t/page-2.png"),
            PathBuf::from("/t/page-1.png"),
        ];
        paths.sort_by_key(|path| page_number(path));
        assert_eq!(paths[0], PathBuf::from("/t/page-1.png"));
        assert_eq!(paths[2], PathBuf::from("/t/page-10.png"));
        assert!(is_page_image(Path::new("/t/page-0001.png")));
        assert!(!is_page_image(Path::new("/t/input.pdf")));
    }
}
