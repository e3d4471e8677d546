use super::{route, Sim, TrainId};
use crate::eventsim::{ChangeKind, SimulationError};
use crate::input::staticinfrastructure::SwitchId;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Order in which trains are allowed through a contested switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainSuccessionTable {
    queue: VecDeque<TrainId>,
    accepted: Vec<TrainId>,
}

impl TrainSuccessionTable {
    pub fn new<I: IntoIterator<Item = TrainId>>(order: I) -> Self {
        TrainSuccessionTable { queue: order.into_iter().collect(), accepted: Vec::new() }
    }

    /// The train that must go next, if any order is imposed.
    pub fn peek_train(&self) -> Option<TrainId> {
        self.queue.front().cloned()
    }

    pub fn would_accept(&self, train: TrainId) -> bool {
        match self.peek_train() {
            None => true,
            Some(head) => head == train,
        }
    }

    pub fn queue(&self) -> &VecDeque<TrainId> {
        &self.queue
    }

    /// Every train granted through this switch, in grant order.
    pub fn accepted(&self) -> &[TrainId] {
        &self.accepted
    }

    pub fn set_order(&mut self, order: &[TrainId]) {
        self.queue = order.iter().cloned().collect();
    }

    /// Grants `train` if it may go now, popping it from the queue.
    /// Returns whether the queue changed.
    pub fn accept(&mut self, train: TrainId) -> Option<bool> {
        if !self.would_accept(train) {
            return None;
        }
        let popped = self.queue.pop_front().is_some();
        self.accepted.push(train);
        Some(popped)
    }
}

/// Replaces the whole queue, e.g. on a dispatcher override.
pub fn change_train_order(sim: &mut Sim, switch: SwitchId, order: Vec<TrainId>) -> Result<(), SimulationError> {
    info!("switch {} train order set to {:?}", switch, order);
    sim.state.successions[switch].set_order(&order);
    sim.publish_change(ChangeKind::SuccessionOrder { switch, order })?;
    table_changed(sim, switch)
}

/// Grants the request of `train` if the queue is empty or starts with it.
/// A denied request changes nothing.
pub fn try_accept_request(sim: &mut Sim, switch: SwitchId, train: TrainId) -> Result<bool, SimulationError> {
    match sim.state.successions[switch].accept(train) {
        None => Ok(false),
        Some(popped) => {
            sim.publish_change(ChangeKind::SuccessionAccepted { switch, train })?;
            if popped {
                table_changed(sim, switch)?;
            }
            Ok(true)
        }
    }
}

fn table_changed(sim: &mut Sim, switch: SwitchId) -> Result<(), SimulationError> {
    let infra = sim.infra;
    for &r in infra.routes_requiring(switch) {
        route::schedule_retry(sim, r)?;
    }
    Ok(())
}
