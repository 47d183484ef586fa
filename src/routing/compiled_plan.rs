use std::fmt;

/// One validated processing stage with its parameters.
///
/// Parameters are checked by the compiler, so applying a stage never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Box blur with an odd square kernel
    Lowpass { kernel: u32 },
    /// Gaussian blur
    Gaussian { sigma: f32 },
    /// Binary threshold; `inverse` maps pixels above the level to black
    Threshold { level: u8, inverse: bool },
    /// Photometric inversion
    Invert,
    /// `value * factor + offset`, saturating
    Gain { factor: f32, offset: i16 },
    /// Repeated 3x3 minimum filter
    Erode { iterations: u8 },
    /// Repeated 3x3 maximum filter
    Dilate { iterations: u8 },
    /// Region of interest, clipped to the frame at apply time
    Crop { x: u32, y: u32, width: u32, height: u32 },
}

impl Stage {
    /// Stage name as written in routing text
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Lowpass { .. } => "lowpass",
            Stage::Gaussian { .. } => "gaussian",
            Stage::Threshold { .. } => "threshold",
            Stage::Invert => "invert",
            Stage::Gain { .. } => "gain",
            Stage::Erode { .. } => "erode",
            Stage::Dilate { .. } => "dilate",
            Stage::Crop { .. } => "crop",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lowpass { kernel } => write!(f, "lowpass {}", kernel),
            Stage::Gaussian { sigma } => write!(f, "gaussian {}", sigma),
            Stage::Threshold { level, inverse } => {
                write!(f, "threshold {}", level)?;
                if *inverse {
                    write!(f, " inverse")?;
                }
                Ok(())
            }
            Stage::Invert => write!(f, "invert"),
            Stage::Gain { factor, offset } => write!(f, "gain {} {}", factor, offset),
            Stage::Erode { iterations } => write!(f, "erode {}", iterations),
            Stage::Dilate { iterations } => write!(f, "dilate {}", iterations),
            Stage::Crop {
                x,
                y,
                width,
                height,
            } => write!(f, "crop {} {} {} {}", x, y, width, height),
        }
    }
}

/// Compiled, immutable routing plan: the ordered stages a frame goes through.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoutingPlan {
    stages: Vec<Stage>,
}

impl RoutingPlan {
    /// Create a new empty plan (frames pass through unchanged)
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the plan has any stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Canonical routing text, one stage per line
impl fmt::Display for RoutingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}
