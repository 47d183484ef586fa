//! Line-oriented console front end
//!
//! Parses one command per line into a [`ConsoleAction`]. `edit` switches to
//! buffer mode: the following lines are collected verbatim as routing text
//! until a line holding a single `.`, and `refresh` compiles that buffer.
//!
//! ```text
//! field <x|y|z> <value>      field <x> <y> <z>      clear
//! bypass on|off              capture on|off         detect on|off
//! worker start|stop          freq <hz>              period <ms>
//! edit                       refresh                status
//! plan                       help                   quit
//! ```

use crate::app::PanelInput;
use crate::types::{Axis, FieldVector};
use thiserror::Error;

/// Line that ends routing buffer mode
pub const END_OF_BUFFER: &str = ".";

pub const HELP: &str = "\
field <x|y|z> <value>   set one axis
field <x> <y> <z>       set all axes
clear                   zero the field
bypass on|off           skip the routing plan
capture on|off          pause or resume frame updates
detect on|off           object detection
worker start|stop       background worker
freq <hz>               worker rate
period <ms>             worker period
edit                    type routing text, end with a single '.'
refresh                 compile the routing text
status                  show subsystem status
plan                    show the active routing plan
quit                    shut down and exit";

/// What the caller should do with a parsed line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    /// Nothing to do (blank line)
    Nothing,
    /// Forward to the control panel
    Input(PanelInput),
    /// Buffer mode started
    EditStarted,
    /// A buffer line was stored
    Buffered,
    /// Buffer mode ended with this many lines
    EditFinished(usize),
    ShowStatus,
    ShowPlan,
    ShowHelp,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not a number: '{0}'")]
    InvalidNumber(String),
}

/// Command parser with routing buffer state
#[derive(Debug, Default)]
pub struct Console {
    editing: Option<Vec<String>>,
    routing_text: String,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether lines are currently collected as routing text
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Routing text that `refresh` will compile
    pub fn routing_text(&self) -> &str {
        &self.routing_text
    }

    /// Parse one input line
    pub fn feed(&mut self, line: &str) -> Result<ConsoleAction, ConsoleError> {
        if let Some(buffer) = self.editing.as_mut() {
            if line.trim() == END_OF_BUFFER {
                let lines = buffer.len();
                self.routing_text = buffer.join("\n");
                self.editing = None;
                return Ok(ConsoleAction::EditFinished(lines));
            }
            buffer.push(line.to_string());
            return Ok(ConsoleAction::Buffered);
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = tokens.split_first() else {
            return Ok(ConsoleAction::Nothing);
        };

        let action = match command.to_ascii_lowercase().as_str() {
            "field" => ConsoleAction::Input(parse_field(args)?),
            "clear" => ConsoleAction::Input(PanelInput::ClearField),
            "bypass" => ConsoleAction::Input(PanelInput::SetBypass(parse_switch(
                args,
                "bypass on|off",
            )?)),
            "capture" => ConsoleAction::Input(PanelInput::SetUpdateEnabled(parse_switch(
                args,
                "capture on|off",
            )?)),
            "detect" => ConsoleAction::Input(PanelInput::SetObjectDetection(parse_switch(
                args,
                "detect on|off",
            )?)),
            "worker" => match args {
                [arg] if arg.eq_ignore_ascii_case("start") => {
                    ConsoleAction::Input(PanelInput::SetWorkerEnabled(true))
                }
                [arg] if arg.eq_ignore_ascii_case("stop") => {
                    ConsoleAction::Input(PanelInput::SetWorkerEnabled(false))
                }
                _ => return Err(ConsoleError::Usage("worker start|stop")),
            },
            "freq" => match args {
                [hz] => ConsoleAction::Input(PanelInput::SetWorkerRateHz(parse_number(hz)?)),
                _ => return Err(ConsoleError::Usage("freq <hz>")),
            },
            "period" => match args {
                [ms] => ConsoleAction::Input(PanelInput::SetWorkerPeriodMs(
                    ms.parse()
                        .map_err(|_| ConsoleError::InvalidNumber(ms.to_string()))?,
                )),
                _ => return Err(ConsoleError::Usage("period <ms>")),
            },
            "edit" => {
                self.editing = Some(Vec::new());
                ConsoleAction::EditStarted
            }
            "refresh" => ConsoleAction::Input(PanelInput::RefreshRouting(self.routing_text.clone())),
            "status" => ConsoleAction::ShowStatus,
            "plan" => ConsoleAction::ShowPlan,
            "help" | "?" => ConsoleAction::ShowHelp,
            "quit" | "exit" => ConsoleAction::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };
        Ok(action)
    }
}

fn parse_field(args: &[&str]) -> Result<PanelInput, ConsoleError> {
    const USAGE: &str = "field <x|y|z> <value> | field <x> <y> <z>";
    match args {
        [axis, value] => {
            let axis: Axis = axis.parse().map_err(|_| ConsoleError::Usage(USAGE))?;
            Ok(PanelInput::SetFieldAxis(axis, parse_number(value)?))
        }
        [x, y, z] => Ok(PanelInput::SetField(FieldVector::new(
            parse_number(x)?,
            parse_number(y)?,
            parse_number(z)?,
        ))),
        _ => Err(ConsoleError::Usage(USAGE)),
    }
}

fn parse_switch(args: &[&str], usage: &'static str) -> Result<bool, ConsoleError> {
    match args {
        [arg] => match arg.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(true),
            "off" | "false" | "0" => Ok(false),
            _ => Err(ConsoleError::Usage(usage)),
        },
        _ => Err(ConsoleError::Usage(usage)),
    }
}

fn parse_number(s: &str) -> Result<f64, ConsoleError> {
    s.parse()
        .map_err(|_| ConsoleError::InvalidNumber(s.to_string()))
}
