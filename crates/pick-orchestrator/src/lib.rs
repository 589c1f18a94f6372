pub mod live;
pub mod pipeline;
pub mod universe;

pub use live::{Clock, LiveRefresh, ManualClock, PriceTick, RefreshSummary, StopReason, SystemClock};
pub use pipeline::{
    fold_outcomes, PassReport, PickPipeline, PipelineConfig, SkippedTicker, TickerOutcome,
};
pub use universe::StockUniverse;
