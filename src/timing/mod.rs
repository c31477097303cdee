//! Модуль для определения временных границ фраз внутри аудиодорожки

pub mod plan;
pub mod reconciler;

pub use plan::{plan_timings, TimingAccuracy, TimingPlan};
pub use reconciler::{estimate_timings, reconcile, PhraseTiming};
