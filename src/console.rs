//! Line commands accepted by the console front-end.

use crate::model::{SensorKind, Selection};

pub const HELP: &str = "\
commands:
  select <unit|all>     poll a unit (or the fleet) every interval
  stop                  stop polling
  units                 list units from the registry
  villages              show village map pins
  target <unit>         send simulated sensor values to <unit>
  set <sensor> <value>  move a slider (temp, vibration, rpm, level)
  send                  publish all four sensor values now
  values                show current slider values
  log                   show recent activity
  help                  this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(Selection),
    Stop,
    Units,
    Villages,
    Target(String),
    Set(SensorKind, f64),
    Send,
    Values,
    Log,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("select", [unit]) => Command::Select(Selection::parse(unit)),
        ("stop", []) => Command::Stop,
        ("units", []) => Command::Units,
        ("villages", []) => Command::Villages,
        ("target", [unit]) => Command::Target((*unit).to_string()),
        ("set", [sensor, value]) => {
            let kind =
                SensorKind::parse(sensor).ok_or_else(|| format!("unknown sensor: {sensor}"))?;
            let value: f64 = value
                .parse()
                .map_err(|_| format!("not a number: {value}"))?;
            Command::Set(kind, value)
        }
        ("send", []) => Command::Send,
        ("values", []) => Command::Values,
        ("log", []) => Command::Log,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => return Err(format!("unrecognised command: {other} (try `help`)")),
    };
    Ok(Some(command))
}
