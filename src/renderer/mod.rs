//! Renderer interface for surfsync
//!
//! The sync engine hands one surface to the renderer every display tick.
//! Drawing itself belongs to the embedding application; this module only
//! defines the interface and a counting renderer for headless runs.

use crate::decoder::{CodecParams, ImportHandle, SurfaceHandle};
use crate::utils::error::Result;

/// A queued surface as handed to the renderer
///
/// The import belongs to the surface pool and lives until the surface is
/// released; renderers must not destroy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaintSource {
    /// Backend handle of the decoded surface
    pub surface: SurfaceHandle,

    /// Render import of the surface (e.g. a bound texture)
    pub import: ImportHandle,
}

/// Renderer trait defining the interface for surface presentation
pub trait Renderer: Send {
    /// Paint a decoded surface
    ///
    /// # Arguments
    ///
    /// * `source` - Surface to show and its render import
    /// * `params` - Parameters of the stream the surface belongs to
    /// * `crop` - Region of the surface holding the picture
    /// * `output` - Region of the display to fill
    fn paint(&mut self, source: PaintSource, params: &CodecParams, crop: Rect, output: Rect) -> Result<()>;

    /// Paint a black picture over `output`
    fn paint_black(&mut self, output: Rect) -> Result<()>;

    /// Display region assigned to this stream
    fn output_rect(&self) -> Rect;
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a rectangle
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Largest rectangle with the aspect ratio of `source`, centered in `self`
    pub fn letterbox(&self, source: Rect) -> Rect {
        if source.is_empty() || self.is_empty() {
            return *self;
        }

        let (sw, sh) = (source.width as u64, source.height as u64);
        let (dw, dh) = (self.width as u64, self.height as u64);

        let (width, height) = if dw * sh > dh * sw {
            // pillarbox
            ((dh * sw / sh) as u32, self.height)
        } else {
            (self.width, (dw * sh / sw) as u32)
        };

        Rect::new(
            self.x + ((self.width - width) / 2) as i32,
            self.y + ((self.height - height) / 2) as i32,
            width,
            height,
        )
    }
}

/// Paint statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Surfaces painted
    pub paints: u64,

    /// Black pictures painted
    pub black_paints: u64,

    /// Paints that showed the same surface as the previous one
    pub repeats: u64,
}

/// Renderer that draws nothing and counts what it was asked to paint
#[derive(Debug)]
pub struct NullRenderer {
    output: Rect,
    last: Option<SurfaceHandle>,
    stats: RenderStats,
}

impl NullRenderer {
    /// Create a renderer for a display region
    pub fn new(output: Rect) -> Self {
        Self {
            output,
            last: None,
            stats: RenderStats::default(),
        }
    }

    /// Surface painted last, `None` after a black picture
    pub fn last_surface(&self) -> Option<SurfaceHandle> {
        self.last
    }

    /// Paint statistics so far
    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}

impl Renderer for NullRenderer {
    fn paint(&mut self, source: PaintSource, _params: &CodecParams, _crop: Rect, _output: Rect) -> Result<()> {
        if self.last == Some(source.surface) {
            self.stats.repeats += 1;
        }
        self.last = Some(source.surface);
        self.stats.paints += 1;
        Ok(())
    }

    fn paint_black(&mut self, _output: Rect) -> Result<()> {
        self.last = None;
        self.stats.black_paints += 1;
        Ok(())
    }

    fn output_rect(&self) -> Rect {
        self.output
    }
}
