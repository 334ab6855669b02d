mod event;
mod psi;

pub use event::{EventColor, LogEvent, LogEventKind};
pub use psi::{PressureRecord, PsiBlock, PsiField, PsiStat, PsiStats, UnknownPsiField};
