//! rigctld command parsing
//!
//! One command per line. Short forms are single letters (`f`, `F 14074000`);
//! long forms are accepted with or without the leading backslash
//! (`\get_freq`, `get_freq`).

use cat_protocol::OperatingMode;

use crate::error::RigctlError;

/// Levels readable with `l` / `get_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Signal strength in dB relative to S9
    Strength,
    /// Transmit power setting as a fraction of maximum
    RfPower,
    /// Standing wave ratio
    Swr,
}

impl Level {
    fn parse(name: &str) -> Result<Self, RigctlError> {
        match name.to_ascii_uppercase().as_str() {
            "STRENGTH" => Ok(Level::Strength),
            "RFPOWER" => Ok(Level::RfPower),
            "SWR" => Ok(Level::Swr),
            _ => Err(RigctlError::NotImplemented(format!("level {}", name))),
        }
    }
}

/// A parsed rigctld command
#[derive(Debug, Clone, PartialEq)]
pub enum RigctlCommand {
    GetFreq,
    SetFreq(u64),
    GetMode,
    /// Mode and requested passband (ignored; the radio keeps its own filter)
    SetMode(OperatingMode, Option<i32>),
    GetPtt,
    SetPtt(bool),
    GetLevel(Level),
    GetVfo,
    ChkVfo,
    Quit,
}

impl RigctlCommand {
    /// Parse one line
    pub fn parse(line: &str) -> Result<Self, RigctlError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(RigctlError::UnknownCommand(String::new()));
        };
        let args: Vec<&str> = words.collect();

        let cmd = match name.strip_prefix('\\').unwrap_or(name) {
            "f" | "get_freq" => RigctlCommand::GetFreq,
            "F" | "set_freq" => RigctlCommand::SetFreq(parse_frequency(arg(&args, 0)?)?),
            "m" | "get_mode" => RigctlCommand::GetMode,
            "M" | "set_mode" => {
                let mode_name = arg(&args, 0)?;
                let mode = OperatingMode::from_hamlib_name(mode_name).ok_or_else(|| {
                    RigctlError::InvalidArgument(format!("mode {}", mode_name))
                })?;
                let passband = match args.get(1) {
                    Some(p) => Some(p.parse::<i32>().map_err(|_| {
                        RigctlError::InvalidArgument(format!("passband {}", p))
                    })?),
                    None => None,
                };
                RigctlCommand::SetMode(mode, passband)
            }
            "t" | "get_ptt" => RigctlCommand::GetPtt,
            "T" | "set_ptt" => match arg(&args, 0)? {
                "0" => RigctlCommand::SetPtt(false),
                // 1 = on, 2 = mic, 3 = data; the radio has one PTT line
                "1" | "2" | "3" => RigctlCommand::SetPtt(true),
                other => return Err(RigctlError::InvalidArgument(format!("ptt {}", other))),
            },
            "l" | "get_level" => RigctlCommand::GetLevel(Level::parse(arg(&args, 0)?)?),
            "v" | "get_vfo" => RigctlCommand::GetVfo,
            "chk_vfo" => RigctlCommand::ChkVfo,
            "q" | "Q" | "quit" | "exit" => RigctlCommand::Quit,
            _ => return Err(RigctlError::UnknownCommand(name.to_string())),
        };
        Ok(cmd)
    }
}

fn arg<'a>(args: &[&'a str], index: usize) -> Result<&'a str, RigctlError> {
    args.get(index)
        .copied()
        .ok_or_else(|| RigctlError::InvalidArgument("missing argument".to_string()))
}

/// Frequencies may arrive as floats (`14074000.000000`); round to whole Hz
fn parse_frequency(text: &str) -> Result<u64, RigctlError> {
    let hz: f64 = text
        .parse()
        .map_err(|_| RigctlError::InvalidArgument(format!("frequency {}", text)))?;
    if !hz.is_finite() || hz < 0.0 || hz > u64::MAX as f64 {
        return Err(RigctlError::InvalidArgument(format!("frequency {}", text)));
    }
    Ok(hz.round() as u64)
}
