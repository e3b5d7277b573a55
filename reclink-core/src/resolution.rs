//! Output resolution planning.
//!
//! Given the screen the host captures, pick the canvas the engine
//! encodes at. Common display ratios map to a fixed preset ladder;
//! anything else is scaled down by a fixed factor table until it fits
//! the 720p pixel budget.

use crate::error::ReclinkError;
use crate::message::{Rect, Size};

/// Pixel budget for the fallback path.
pub const MAX_OUTPUT_AREA: i64 = 1280 * 720;

/// Two ratios are the same display ratio when they differ by less than this.
pub const RATIO_TOLERANCE: f32 = 0.0005;

/// Divisors tried in order on the fallback path.
const SCALE_FACTORS: [f64; 11] = [
    1.0,
    1.25,
    1.0 / 0.75,
    1.5,
    1.0 / 0.6,
    1.75,
    2.0,
    2.25,
    2.5,
    2.75,
    3.0,
];

// ── DisplayRatio ─────────────────────────────────────────────────

/// A known screen ratio (height / width) and its preset ladder,
/// largest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRatio {
    pub name: &'static str,
    pub value: f32,
    pub presets: [Size; 3],
}

const fn ladder(h1: i32, h2: i32, h3: i32) -> [Size; 3] {
    [Size::new(1280, h1), Size::new(960, h2), Size::new(640, h3)]
}

/// Matched first to last.
pub const DISPLAY_RATIOS: [DisplayRatio; 8] = [
    DisplayRatio {
        name: "5:4",
        value: 4.0 / 5.0,
        presets: ladder(1024, 768, 512),
    },
    DisplayRatio {
        name: "4:3",
        value: 3.0 / 4.0,
        presets: ladder(960, 720, 480),
    },
    DisplayRatio {
        name: "25:16",
        value: 16.0 / 25.0,
        presets: ladder(800, 600, 400),
    },
    DisplayRatio {
        name: "16:10",
        value: 10.0 / 16.0,
        presets: ladder(800, 600, 400),
    },
    DisplayRatio {
        name: "5:3",
        value: 3.0 / 5.0,
        presets: ladder(768, 576, 384),
    },
    DisplayRatio {
        name: "16:9",
        value: 9.0 / 16.0,
        presets: ladder(720, 540, 360),
    },
    DisplayRatio {
        name: "21:9",
        value: 27.0 / 64.0,
        presets: ladder(540, 405, 270),
    },
    DisplayRatio {
        name: "43:18",
        value: 18.0 / 43.0,
        presets: ladder(540, 405, 270),
    },
];

/// The known ratio a screen matches, if any. Portrait and empty
/// screens never match.
pub fn display_ratio(width: i32, height: i32) -> Option<&'static DisplayRatio> {
    if height > width || width <= 0 || height <= 0 {
        return None;
    }
    let ratio = height as f32 / width as f32;
    DISPLAY_RATIOS
        .iter()
        .find(|known| (ratio - known.value).abs() < RATIO_TOLERANCE)
}

// ── Planner ──────────────────────────────────────────────────────

/// Output size for a `width` x `height` screen.
///
/// Fails with [`ReclinkError::InvalidResolution`] when no usable
/// (non-zero) size comes out.
pub fn plan_resolution(width: i32, height: i32) -> Result<Size, ReclinkError> {
    if let Some(ratio) = display_ratio(width, height)
        && let Some(preset) = ratio
            .presets
            .iter()
            .find(|p| width >= p.width && height >= p.height)
    {
        // not every preset is a multiple of 4 (960x405)
        return Ok(Size::new(preset.width & !3, preset.height & !3));
    }

    let (mut out_w, mut out_h) = (width.max(0), height.max(0));
    let mut factors = SCALE_FACTORS.iter();
    while out_w as i64 * out_h as i64 > MAX_OUTPUT_AREA {
        let Some(factor) = factors.next() else {
            break;
        };
        out_w = (width as f64 / factor) as i32;
        out_h = (height as f64 / factor) as i32;
    }
    let output = Size::new(out_w & !3, out_h & !3);

    if output.is_empty() {
        return Err(ReclinkError::InvalidResolution { width, height });
    }
    Ok(output)
}

// ── Resolution ───────────────────────────────────────────────────

/// The three sizes the engine works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Canvas size: the screen the host captures.
    pub base: Size,
    /// Encoded size.
    pub output: Size,
    /// Extent of the captured source (the crop rectangle).
    pub original: Size,
}

impl Resolution {
    pub fn plan(screen: Size, crop: Rect) -> Result<Self, ReclinkError> {
        let output = plan_resolution(screen.width, screen.height)?;
        Ok(Self {
            base: screen,
            output,
            original: crop.size(),
        })
    }

    /// Same canvas with a new source extent.
    pub fn with_original(self, original: Size) -> Self {
        Self { original, ..self }
    }

    pub fn fit(&self) -> SourceFit {
        fit_source(self.base, self.original)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "org={}, base={}, output={}",
            self.original, self.base, self.output
        )
    }
}

// ── SourceFit ────────────────────────────────────────────────────

/// Uniform scale and top-left position that letterbox the source
/// inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFit {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

impl SourceFit {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        x: 0.0,
        y: 0.0,
    };
}

/// Scale `original` to the largest size that fits `base` without
/// changing its ratio, centred along the axis with spare room.
pub fn fit_source(base: Size, original: Size) -> SourceFit {
    if base.is_empty() || original.is_empty() {
        return SourceFit::IDENTITY;
    }

    let base_w = base.width as f32;
    let base_h = base.height as f32;
    let base_ratio = base_w / base_h;
    let original_ratio = original.width as f32 / original.height as f32;

    if base_ratio >= original_ratio {
        // pillarbox
        let width = base_h * original_ratio;
        SourceFit {
            scale: base_h / original.height as f32,
            x: (base_w - width) / 2.0,
            y: 0.0,
        }
    } else {
        // letterbox
        let height = base_w / original_ratio;
        SourceFit {
            scale: base_w / original.width as f32,
            x: 0.0,
            y: (base_h - height) / 2.0,
        }
    }
}
