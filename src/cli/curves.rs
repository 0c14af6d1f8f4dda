//! Curves command implementation

use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::risk::RiskCurves;

#[derive(Args, Debug)]
pub struct CurvesArgs {
    /// Index whose drawdown floor applies
    #[arg(long, default_value = "NIFTY")]
    pub index: String,

    /// Minutes spent below entry, for the reverse stop
    #[arg(long, default_value = "0")]
    pub minutes_below: i64,

    /// Current ATR over recent ATR, for the reverse stop
    #[arg(long)]
    pub atr_ratio: Option<Decimal>,
}

impl CurvesArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let curves = RiskCurves::from_config(config);
        let floor = config.capital.policy_for(&self.index).drawdown_floor_pct;

        println!("Peak drawdown ({}, floor {}%)", self.index, floor);
        println!("  {:>8}  {:>10}  {:>10}", "profit%", "allowed%", "trail%");
        for step in 0..=10 {
            let profit = Decimal::from(step * 5);
            let allowed = curves
                .allowed_drawdown(profit, floor)
                .map(|d| d.round_dp(2).to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>8}  {:>10}  {:>10}",
                profit,
                allowed,
                curves.trailing_offset(profit)
            );
        }

        println!();
        println!(
            "Reverse stop-loss ({} min below entry, atr ratio {})",
            self.minutes_below,
            self.atr_ratio
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        println!("  {:>8}  {:>10}", "pnl%", "allowed%");
        for step in 1..=8 {
            let pnl = Decimal::from(step) * dec!(-2.5);
            let allowed = curves
                .reverse_stop_loss(pnl, self.minutes_below * 60, self.atr_ratio)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:>8}  {:>10}", pnl, allowed);
        }
        Ok(())
    }
}
