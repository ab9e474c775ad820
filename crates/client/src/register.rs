//! A cashier's sale in progress.
//!
//! Nothing here touches persisted state until [`Register::submit`]; dropping
//! a register abandons the sale.

use std::sync::Arc;

use tracing::{info, warn};

use kiradopay_calculator::{Calculator, CalculatorState};
use kiradopay_catalog::Event;
use kiradopay_core::{DomainError, DomainResult, EventCode, ItemCode};
use kiradopay_ledger::{MAX_RECORDS_PER_RECEIPT, ReceiptInput, RecordInput};

use crate::buffer::ReceiptBuffer;
use crate::gateway::LedgerGateway;
use crate::sync::{Submission, SyncManager};

pub struct Register<G, B> {
    event: Event,
    calculator: Calculator,
    lines: Vec<RecordInput>,
    sync: Arc<SyncManager<G, B>>,
}

impl<G: LedgerGateway, B: ReceiptBuffer> Register<G, B> {
    /// Open a register for `event`, compiling its calculator up front.
    pub fn new(sync: Arc<SyncManager<G, B>>, event: Event) -> DomainResult<Self> {
        let calculator = event
            .calculator()
            .map_err(|e| DomainError::validation(format!("calculator does not compile: {e}")))?;
        Ok(Self {
            event,
            calculator,
            lines: Vec::new(),
            sync,
        })
    }

    /// Fetch the event from the server and open a register for it.
    pub async fn open(sync: Arc<SyncManager<G, B>>, code: &EventCode) -> DomainResult<Self> {
        let event = sync.gateway().get_event(code).await?;
        Self::new(sync, event)
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Lines of the current sale, in the order they were first added.
    pub fn lines(&self) -> &[RecordInput] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add `count` of an item; an item already on the sale keeps its position.
    pub fn add(&mut self, item: &ItemCode, count: i64) -> DomainResult<()> {
        if count <= 0 {
            return Err(DomainError::validation("count must be positive"));
        }
        if !self.event.displays(item) {
            return Err(DomainError::validation(format!("item not displayed: {item}")));
        }

        if let Some(line) = self.line_mut(item) {
            line.count = line.count.saturating_add(count);
            return Ok(());
        }
        if self.lines.len() >= MAX_RECORDS_PER_RECEIPT {
            return Err(DomainError::validation("sale has too many lines"));
        }
        self.lines.push(RecordInput {
            item_code: item.clone(),
            count,
            dedication: false,
        });
        Ok(())
    }

    /// Set the count of an item on the sale; zero removes the line.
    pub fn set_count(&mut self, item: &ItemCode, count: i64) -> DomainResult<()> {
        if count < 0 {
            return Err(DomainError::validation("count must not be negative"));
        }
        if count == 0 {
            self.remove(item);
            return Ok(());
        }
        match self.line_mut(item) {
            Some(line) => {
                line.count = count;
                Ok(())
            }
            None => self.add(item, count),
        }
    }

    pub fn set_dedication(&mut self, item: &ItemCode, dedication: bool) -> DomainResult<()> {
        let line = self
            .line_mut(item)
            .ok_or_else(|| DomainError::not_found(format!("item not on sale: {item}")))?;
        line.dedication = dedication;
        Ok(())
    }

    pub fn remove(&mut self, item: &ItemCode) {
        self.lines.retain(|l| &l.item_code != item);
    }

    /// Abandon the current sale.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn state(&self) -> CalculatorState {
        self.input_with_total(0).calculator_state()
    }

    /// Price the current sale with the event's calculator.
    ///
    /// A failing calculator is an error, never a zero total.
    pub fn total(&self) -> DomainResult<i64> {
        let total = self.calculator.evaluate(&self.state()).map_err(|e| {
            warn!(event_code = %self.event.code, error = %e, "calculator failed");
            DomainError::calculation(e.to_string())
        })?;
        Ok(total.round() as i64)
    }

    /// Price and submit the sale. On success the register is cleared for the
    /// next customer; on failure the sale is kept so the cashier can fix it.
    pub async fn submit(&mut self) -> DomainResult<Submission> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("sale has no items"));
        }
        let input = self.input_with_total(self.total()?);
        input.validate()?;

        let submission = self.sync.submit(&self.event.code, input).await?;
        info!(
            event_code = %self.event.code,
            buffered = matches!(submission, Submission::Buffered(_)),
            "sale submitted"
        );
        self.lines.clear();
        Ok(submission)
    }

    fn input_with_total(&self, total: i64) -> ReceiptInput {
        ReceiptInput {
            total,
            client_id: None,
            records: self.lines.clone(),
        }
    }

    fn line_mut(&mut self, item: &ItemCode) -> Option<&mut RecordInput> {
        self.lines.iter_mut().find(|l| &l.item_code == item)
    }
}
