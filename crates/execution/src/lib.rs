//! Simulated execution gateway.
//!
//! Fills every order locally at the request price adjusted by slippage
//! toward the order side, plus a commission on notional. Makes zero
//! external calls, so it doubles as the paper-trading gateway: the ledger
//! is the source of truth and the report only confirms the expected fill.

use anyhow::Result;
use async_trait::async_trait;
use intraday_core::config::ExecutionConfig;
use intraday_core::events::{ExecutionReport, OrderRequest, OrderSide, OrderStatus};
use intraday_core::traits::ExecutionGateway;
use rust_decimal::Decimal;

pub struct SimulatedGateway {
    commission_rate: Decimal,
    slippage_bps: Decimal,
}

impl SimulatedGateway {
    /// # Errors
    ///
    /// Returns an error if a config fraction cannot be represented as a
    /// `Decimal`.
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        Ok(Self {
            commission_rate: Decimal::try_from(config.commission_rate)?,
            slippage_bps: Decimal::try_from(config.slippage_bps)?,
        })
    }

    fn apply_slippage(&self, price: Decimal, side: OrderSide) -> Decimal {
        let slippage = price * self.slippage_bps / Decimal::from(10_000);
        match side {
            OrderSide::Buy => price + slippage,
            OrderSide::Sell => price - slippage,
        }
    }
}

#[async_trait]
impl ExecutionGateway for SimulatedGateway {
    async fn send_order(&mut self, order: OrderRequest) -> Result<ExecutionReport> {
        let fill_price = self.apply_slippage(order.price, order.side);
        let commission = fill_price * Decimal::from(order.quantity) * self.commission_rate;

        let report = ExecutionReport {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: order.symbol,
            side: order.side,
            filled_quantity: order.quantity,
            average_price: fill_price,
            commission,
            status: OrderStatus::Filled,
            timestamp: order.timestamp,
        };
        tracing::info!(
            order_id = %report.order_id,
            symbol = %report.symbol,
            side = ?report.side,
            quantity = report.filled_quantity,
            price = %report.average_price,
            "simulated fill"
        );
        Ok(report)
    }
}
