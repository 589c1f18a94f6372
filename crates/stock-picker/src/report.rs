//! Plain-text rendering of a pass report. Computation lives in the library crates.

use std::fmt::Write;

use pick_orchestrator::{PassReport, PriceTick};

pub fn render_text(report: &PassReport, investment_amount: f64) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Stock picks ({} strategy) generated {}",
        report.strategy,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(
        out,
        "{} analysed, {} ranked, {} skipped\n",
        report.total_analyzed,
        report.ranked.len(),
        report.skipped.len()
    );

    if report.ranked.is_empty() {
        let _ = writeln!(out, "No ticker produced a usable forecast.");
    } else {
        let _ = writeln!(
            out,
            "{:>4}  {:<8} {:>10} {:>10} {:>9} {:>9}  {:<12} {:>10}",
            "Rank", "Ticker", "Current", "Predicted", "Return%", "Score", "Signal", "Shares"
        );
        for (i, signal) in report.ranked.iter().enumerate() {
            let shares = if signal.current_price > 0.0 {
                investment_amount / signal.current_price
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{:>4}  {:<8} {:>10.2} {:>10.2} {:>+9.2} {:>9.3}  {:<12} {:>10.4}",
                i + 1,
                signal.ticker,
                signal.current_price,
                signal.predicted_price,
                signal.expected_return_pct,
                signal.composite_score,
                signal.recommendation.to_label(),
                shares
            );
        }
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped:");
        for skipped in &report.skipped {
            let _ = writeln!(
                out,
                "  {:<8} {:<22} {}",
                skipped.ticker,
                skipped.kind.label(),
                skipped.reason
            );
        }
    }

    if let (Some(best), Some(allocation)) = (report.best(), &report.best_allocation) {
        let _ = writeln!(out, "\nBest pick: {} ({})", best.ticker, best.recommendation.to_label());
        let _ = writeln!(
            out,
            "  Investing ${:.2} buys {:.4} shares at ${:.2}",
            allocation.amount, allocation.shares_to_buy, best.current_price
        );
        let _ = writeln!(
            out,
            "  Projected value ${:.2} ({:+.2} profit, {:+.2}%)",
            allocation.projected_value, allocation.projected_profit, best.expected_return_pct
        );
        if let Some(pe) = best.pe_ratio {
            let _ = writeln!(out, "  Trailing P/E {:.1}", pe);
        }
    }

    out
}

pub fn render_tick(tick: &PriceTick) -> String {
    format!(
        "{}  {:<8} {:>10.2}",
        tick.observed_at.format("%H:%M:%S"),
        tick.ticker,
        tick.price
    )
}
