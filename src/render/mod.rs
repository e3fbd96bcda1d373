use anyhow::{Result, anyhow};
use image::RgbaImage;
use std::io::Cursor;

use crate::layout::RenderCommand;

mod pdf;
mod raster;

pub use pdf::PdfRenderer;
pub use raster::RasterRenderer;

/// Draws onto one page at a time. Rectangles are filled white and text is
/// drawn black; coordinates are page pixels with a top-left origin.
pub trait Renderer {
    /// Binds the renderer to `page`, which becomes the drawing background.
    fn set_page(&mut self, page: &RgbaImage) -> Result<()>;

    fn render_rect(&mut self, left: f32, right: f32, top: f32, bottom: f32, radius: u32)
    -> Result<()>;

    /// `y` is the top edge of the text, not its baseline.
    fn render_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<()>;
}

/// A renderer producing one output page per input page.
pub trait PagedRenderer: Renderer {
    /// Closes the current page. The next `set_page` opens a new one.
    fn next_page(&mut self) -> Result<()>;
}

/// Draws a group's commands in order: each line's blank rectangle, then its text.
pub fn render_commands<R>(renderer: &mut R, commands: &[RenderCommand]) -> Result<()>
where
    R: Renderer + ?Sized,
{
    for command in commands {
        let rect = &command.rect;
        renderer.render_rect(rect.left, rect.right, rect.top, rect.bottom, command.radius)?;
        renderer.render_text(&command.text, command.x, command.y, command.font_size)?;
    }
    Ok(())
}

pub fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/webp" => Some(image::ImageFormat::WebP),
        "image/tiff" => Some(image::ImageFormat::Tiff),
        "image/bmp" => Some(image::ImageFormat::Bmp),
        _ => None,
    }
}

pub fn encode_image(image: RgbaImage, mime: &str) -> Result<Vec<u8>> {
    let format =
        image_format_from_mime(mime).ok_or_else(|| anyhow!("unsupported output image mime '{}'", mime))?;
    let image = match format {
        image::ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(
            image::DynamicImage::ImageRgba8(image).to_rgb8(),
        ),
        _ => image::DynamicImage::ImageRgba8(image),
    };
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

fn no_page() -> anyhow::Error {
    crate::error::PipelineError::Render("no page is bound to the renderer".to_string()).into()
}
