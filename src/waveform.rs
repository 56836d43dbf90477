//! Value Change Dump output of signal activity.

use std::io::{self, Write};

use crate::time::TimeUnit;
use crate::value::Value;

/// Writes IEEE 1364 VCD. Signals are declared once in the header; every
/// later change is appended under its timestamp.
pub struct VcdRecorder<W: Write> {
    writer: W,
    codes: Vec<String>,
    current_time: Option<u64>,
}

impl<W: Write> VcdRecorder<W> {
    /// Writes the header and the initial values of `signals` (name, value).
    pub fn new(mut writer: W, timescale: TimeUnit, signals: &[(String, Value)]) -> io::Result<Self> {
        writeln!(writer, "$version synctb $end")?;
        writeln!(writer, "$timescale 1{} $end", vcd_unit(timescale))?;
        let codes: Vec<String> = (0..signals.len()).map(id_code).collect();
        for ((name, value), code) in signals.iter().zip(&codes) {
            let (scope, local) = name.rsplit_once('.').unwrap_or(("top", name.as_str()));
            writeln!(writer, "$scope module {} $end", scope)?;
            writeln!(writer, "$var wire {} {} {} $end", value.width(), code, local)?;
            writeln!(writer, "$upscope $end")?;
        }
        writeln!(writer, "$enddefinitions $end")?;
        writeln!(writer, "#0")?;
        writeln!(writer, "$dumpvars")?;
        for ((_, value), code) in signals.iter().zip(&codes) {
            writeln!(writer, "{}", format_change(value, code))?;
        }
        writeln!(writer, "$end")?;
        Ok(Self {
            writer,
            codes,
            current_time: Some(0),
        })
    }

    /// Records a change of the `index`-th declared signal. Unknown indices are
    /// signals declared after the header and are not traced.
    pub fn record(&mut self, time: u64, index: usize, value: &Value) -> io::Result<()> {
        let Some(code) = self.codes.get(index) else {
            return Ok(());
        };
        if self.current_time != Some(time) {
            writeln!(self.writer, "#{}", time)?;
            self.current_time = Some(time);
        }
        writeln!(self.writer, "{}", format_change(value, code))
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn vcd_unit(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Sec => "s",
        other => other.as_str(),
    }
}

/// Printable ASCII identifier codes starting at `!`.
fn id_code(index: usize) -> String {
    let mut code = String::new();
    let mut idx = index;
    loop {
        code.push((b'!' + (idx % 94) as u8) as char);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    code
}

fn format_change(value: &Value, code: &str) -> String {
    if value.width() == 1 {
        format!("{}{}", value.lsb().to_char(), code)
    } else {
        format!("b{} {}", value.bin(), code)
    }
}
