use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// One `<resource>:<scope>` block of a PSI dump line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PsiBlock {
    CpuSome,
    /// Not reported by every kernel
    CpuFull,
    IoSome,
    IoFull,
    /// Not reported by every kernel
    IrqFull,
    MemorySome,
    MemoryFull,
}

impl PsiBlock {
    /// All blocks, in the order they appear on a dump line.
    pub const ALL: [PsiBlock; 7] = [
        PsiBlock::CpuSome,
        PsiBlock::CpuFull,
        PsiBlock::IoSome,
        PsiBlock::IoFull,
        PsiBlock::IrqFull,
        PsiBlock::MemorySome,
        PsiBlock::MemoryFull,
    ];

    /// The column prefix for this block, e.g. `cpu_some`.
    pub fn prefix(&self) -> &'static str {
        match self {
            PsiBlock::CpuSome => "cpu_some",
            PsiBlock::CpuFull => "cpu_full",
            PsiBlock::IoSome => "io_some",
            PsiBlock::IoFull => "io_full",
            PsiBlock::IrqFull => "irq_full",
            PsiBlock::MemorySome => "memory_some",
            PsiBlock::MemoryFull => "memory_full",
        }
    }

    /// The label that introduces this block on a dump line, e.g. `cpu:some`.
    pub fn label(&self) -> &'static str {
        match self {
            PsiBlock::CpuSome => "cpu:some",
            PsiBlock::CpuFull => "cpu:full",
            PsiBlock::IoSome => "io:some",
            PsiBlock::IoFull => "io:full",
            PsiBlock::IrqFull => "irq:full",
            PsiBlock::MemorySome => "memory:some",
            PsiBlock::MemoryFull => "memory:full",
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, PsiBlock::CpuFull | PsiBlock::IrqFull)
    }
}

/// One statistic within a [PsiBlock].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PsiStat {
    Avg10,
    Avg60,
    Avg300,
    /// Cumulative stall time in microseconds
    Total,
}

impl PsiStat {
    pub const ALL: [PsiStat; 4] = [PsiStat::Avg10, PsiStat::Avg60, PsiStat::Avg300, PsiStat::Total];

    pub fn suffix(&self) -> &'static str {
        match self {
            PsiStat::Avg10 => "avg10",
            PsiStat::Avg60 => "avg60",
            PsiStat::Avg300 => "avg300",
            PsiStat::Total => "total",
        }
    }
}

/// A single PSI metric, named `<resource>_<scope>_<stat>` (e.g. `cpu_some_avg10`).
///
/// This is how the metric to monitor is configured, and it is also the column name of that metric
/// in the pressure table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PsiField {
    pub block: PsiBlock,
    pub stat: PsiStat,
}

impl PsiField {
    pub fn new(block: PsiBlock, stat: PsiStat) -> Self {
        Self { block, stat }
    }

    /// Every field of a pressure record, in column order.
    pub fn all() -> impl Iterator<Item = PsiField> {
        PsiBlock::ALL
            .into_iter()
            .flat_map(|block| PsiStat::ALL.into_iter().map(move |stat| PsiField::new(block, stat)))
    }
}

impl Default for PsiField {
    fn default() -> Self {
        Self::new(PsiBlock::CpuSome, PsiStat::Avg10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown PSI field `{0}`, expected `<resource>_<scope>_<stat>` such as `cpu_some_avg10`")]
pub struct UnknownPsiField(pub String);

impl FromStr for PsiField {
    type Err = UnknownPsiField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PsiField::all()
            .find(|field| field.to_string() == s)
            .ok_or_else(|| UnknownPsiField(s.to_string()))
    }
}

impl TryFrom<String> for PsiField {
    type Error = UnknownPsiField;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PsiField> for String {
    fn from(value: PsiField) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PsiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.block.prefix(), self.stat.suffix())
    }
}

/// The values of one [PsiBlock] at a polling instant.
///
/// Blocks missing from a dump line are all zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PsiStats {
    pub avg10: f64,
    pub avg60: f64,
    pub avg300: f64,
    pub total: u64,
}

impl PsiStats {
    pub fn get(&self, stat: PsiStat) -> f64 {
        match stat {
            PsiStat::Avg10 => self.avg10,
            PsiStat::Avg60 => self.avg60,
            PsiStat::Avg300 => self.avg300,
            PsiStat::Total => self.total as f64,
        }
    }
}

/// One line of a PSI dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PressureRecord {
    /// Device uptime reported by the monitor
    pub uptime_millis: i64,
    /// Local wall clock time, truncated to microseconds
    pub local_datetime: String,
    /// `local_datetime` as milliseconds since the Unix epoch, or 0 if it failed to parse
    pub epoch_millis: i64,
    /// Milliseconds since the first record of the dump
    pub monitor_start_relative_millis: i64,
    pub cpu_some: PsiStats,
    pub cpu_full: PsiStats,
    pub io_some: PsiStats,
    pub io_full: PsiStats,
    pub irq_full: PsiStats,
    pub memory_some: PsiStats,
    pub memory_full: PsiStats,
    /// Events reported by the monitor at this polling instant
    pub event_descriptions: Vec<String>,
}

impl PressureRecord {
    pub fn block(&self, block: PsiBlock) -> &PsiStats {
        match block {
            PsiBlock::CpuSome => &self.cpu_some,
            PsiBlock::CpuFull => &self.cpu_full,
            PsiBlock::IoSome => &self.io_some,
            PsiBlock::IoFull => &self.io_full,
            PsiBlock::IrqFull => &self.irq_full,
            PsiBlock::MemorySome => &self.memory_some,
            PsiBlock::MemoryFull => &self.memory_full,
        }
    }

    pub(crate) fn block_mut(&mut self, block: PsiBlock) -> &mut PsiStats {
        match block {
            PsiBlock::CpuSome => &mut self.cpu_some,
            PsiBlock::CpuFull => &mut self.cpu_full,
            PsiBlock::IoSome => &mut self.io_some,
            PsiBlock::IoFull => &mut self.io_full,
            PsiBlock::IrqFull => &mut self.irq_full,
            PsiBlock::MemorySome => &mut self.memory_some,
            PsiBlock::MemoryFull => &mut self.memory_full,
        }
    }

    /// Read a single metric from this record.
    pub fn value(&self, field: PsiField) -> f64 {
        self.block(field.block).get(field.stat)
    }
}
