use super::compiled_plan::{RoutingPlan, Stage};
use super::error::{CompileError, CompileResult};
use std::str::FromStr;

/// Marker starting a comment line
pub const COMMENT_MARKER: char = '#';

/// Maximum number of stages in one plan
pub const MAX_STAGES: usize = 64;

const MAX_LOWPASS_KERNEL: u32 = 31;
const MAX_SIGMA: f32 = 20.0;
const MAX_GAIN: f32 = 16.0;
const MAX_MORPH_ITERATIONS: u8 = 16;

/// Compiles routing text into a [`RoutingPlan`]
///
/// The compiler is stateless; compiling the same text twice yields equal
/// plans, and a failure never yields a partial plan.
pub struct RoutingCompiler;

impl RoutingCompiler {
    /// Compile an ordered sequence of routing lines.
    ///
    /// # Grammar
    ///
    /// ```text
    /// lowpass  <kernel>              odd, 1..=31
    /// gaussian <sigma>               0 < sigma <= 20
    /// threshold <level> [inverse]    0..=255
    /// invert
    /// gain <factor> [offset]         0..=16, offset -255..=255
    /// erode  [iterations]            1..=16, default 1
    /// dilate [iterations]            1..=16, default 1
    /// crop <x> <y> <width> <height>  width, height >= 1
    /// ```
    ///
    /// Blank lines and lines starting with `#` are ignored. Stage names are
    /// case-insensitive.
    ///
    /// # Errors
    /// A [`CompileError`] carrying the 1-based number of the first bad line.
    pub fn compile<I, S>(lines: I) -> CompileResult<RoutingPlan>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stages = Vec::new();

        for (idx, raw) in lines.into_iter().enumerate() {
            let line_no = idx + 1;
            let line = raw.as_ref().trim();
            if line.is_empty() || line.starts_with(COMMENT_MARKER) {
                continue;
            }

            let stage = Self::parse_line(line).map_err(|msg| CompileError::new(line_no, msg))?;
            if stages.len() == MAX_STAGES {
                return Err(CompileError::new(
                    line_no,
                    format!("too many stages (limit is {})", MAX_STAGES),
                ));
            }
            stages.push(stage);
        }

        Ok(RoutingPlan::from_stages(stages))
    }

    /// Compile a whole text buffer, splitting it into lines verbatim
    pub fn compile_text(text: &str) -> CompileResult<RoutingPlan> {
        Self::compile(text.lines())
    }

    fn parse_line(line: &str) -> Result<Stage, String> {
        let mut tokens = line.split_ascii_whitespace();
        let name = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = tokens.collect();

        match name.as_str() {
            "lowpass" => {
                expect_args(&name, &args, 1, 1)?;
                let kernel: u32 = parse_arg(&name, "kernel", args[0])?;
                if kernel == 0 || kernel > MAX_LOWPASS_KERNEL || kernel % 2 == 0 {
                    return Err(format!(
                        "lowpass kernel must be an odd number between 1 and {}, got {}",
                        MAX_LOWPASS_KERNEL, kernel
                    ));
                }
                Ok(Stage::Lowpass { kernel })
            }
            "gaussian" => {
                expect_args(&name, &args, 1, 1)?;
                let sigma: f32 = parse_arg(&name, "sigma", args[0])?;
                if !(sigma > 0.0 && sigma <= MAX_SIGMA) {
                    return Err(format!(
                        "gaussian sigma must be in (0, {}], got {}",
                        MAX_SIGMA, args[0]
                    ));
                }
                Ok(Stage::Gaussian { sigma })
            }
            "threshold" => {
                expect_args(&name, &args, 1, 2)?;
                let level: u8 = parse_arg(&name, "level", args[0])?;
                let inverse = match args.get(1) {
                    None => false,
                    Some(flag) if flag.eq_ignore_ascii_case("inverse") => true,
                    Some(flag) => {
                        return Err(format!(
                            "threshold expects 'inverse' as second argument, got '{}'",
                            flag
                        ))
                    }
                };
                Ok(Stage::Threshold { level, inverse })
            }
            "invert" => {
                expect_args(&name, &args, 0, 0)?;
                Ok(Stage::Invert)
            }
            "gain" => {
                expect_args(&name, &args, 1, 2)?;
                let factor: f32 = parse_arg(&name, "factor", args[0])?;
                if !(0.0..=MAX_GAIN).contains(&factor) {
                    return Err(format!(
                        "gain factor must be in [0, {}], got {}",
                        MAX_GAIN, args[0]
                    ));
                }
                let offset: i16 = match args.get(1) {
                    Some(arg) => parse_arg(&name, "offset", arg)?,
                    None => 0,
                };
                if !(-255..=255).contains(&offset) {
                    return Err(format!("gain offset must be in [-255, 255], got {}", offset));
                }
                Ok(Stage::Gain { factor, offset })
            }
            "erode" | "dilate" => {
                expect_args(&name, &args, 0, 1)?;
                let iterations: u8 = match args.first() {
                    Some(arg) => parse_arg(&name, "iterations", arg)?,
                    None => 1,
                };
                if iterations == 0 || iterations > MAX_MORPH_ITERATIONS {
                    return Err(format!(
                        "{} iterations must be between 1 and {}, got {}",
                        name, MAX_MORPH_ITERATIONS, iterations
                    ));
                }
                if name == "erode" {
                    Ok(Stage::Erode { iterations })
                } else {
                    Ok(Stage::Dilate { iterations })
                }
            }
            "crop" => {
                expect_args(&name, &args, 4, 4)?;
                let x: u32 = parse_arg(&name, "x", args[0])?;
                let y: u32 = parse_arg(&name, "y", args[1])?;
                let width: u32 = parse_arg(&name, "width", args[2])?;
                let height: u32 = parse_arg(&name, "height", args[3])?;
                if width == 0 || height == 0 {
                    return Err("crop width and height must be at least 1".to_string());
                }
                Ok(Stage::Crop {
                    x,
                    y,
                    width,
                    height,
                })
            }
            "detect" => Err(
                "object detection is enabled by its toggle and always runs after the plan"
                    .to_string(),
            ),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

fn expect_args(name: &str, args: &[&str], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(format!(
            "{} takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        ));
    }
    Ok(())
}

fn parse_arg<T: FromStr>(stage: &str, what: &str, token: &str) -> Result<T, String> {
    token
        .parse::<T>()
        .map_err(|_| format!("{}: invalid {} '{}'", stage, what, token))
}
