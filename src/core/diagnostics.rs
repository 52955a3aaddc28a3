//! Diagnostic side channel: labeled histogram dumps written after each step.
//!
//! Sinks never feed back into the computation. I/O failures are logged
//! and swallowed.

use std::io::Write;

use tracing::warn;

/// One labeled snapshot of the working histogram.
#[derive(Clone, Copy, Debug)]
pub struct HistogramDump<'a> {
    pub label: &'a str,
    pub step: u32,
    pub u: f64,
    pub n2: u32,
    pub f0: f64,
    pub d_gy: &'a [f64],
    pub mass: &'a [f64],
}

pub trait DiagnosticSink {
    fn record(&mut self, dump: &HistogramDump<'_>);
}

/// Plain-text sink: a header line per dump followed by `d_gy mass` rows.
pub struct TextSink<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_dump(&mut self, dump: &HistogramDump<'_>) -> std::io::Result<()> {
        writeln!(
            self.out,
            "# {} step={} u={:e} n2={} f0={:e} bins={}",
            dump.label,
            dump.step,
            dump.u,
            dump.n2,
            dump.f0,
            dump.mass.len()
        )?;
        for (d, m) in dump.d_gy.iter().zip(dump.mass) {
            writeln!(self.out, "{d:e}\t{m:e}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> DiagnosticSink for TextSink<W> {
    fn record(&mut self, dump: &HistogramDump<'_>) {
        if self.failed {
            return;
        }
        if let Err(err) = self.write_dump(dump) {
            warn!("diagnostic output disabled after write error: {err}");
            self.failed = true;
        }
    }
}

/// Owned copy of a dump, kept by [`MemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDump {
    pub label: String,
    pub step: u32,
    pub u: f64,
    pub n2: u32,
    pub f0: f64,
    pub d_gy: Vec<f64>,
    pub mass: Vec<f64>,
}

/// Collects every dump in memory.
#[derive(Default, Debug)]
pub struct MemorySink {
    pub dumps: Vec<RecordedDump>,
}

impl DiagnosticSink for MemorySink {
    fn record(&mut self, dump: &HistogramDump<'_>) {
        self.dumps.push(RecordedDump {
            label: dump.label.to_string(),
            step: dump.step,
            u: dump.u,
            n2: dump.n2,
            f0: dump.f0,
            d_gy: dump.d_gy.to_vec(),
            mass: dump.mass.to_vec(),
        });
    }
}
