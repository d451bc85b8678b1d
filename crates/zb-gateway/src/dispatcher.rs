//! Command dispatcher
//!
//! Maps an opcode byte to its handler, checks the parameter length and turns
//! every outcome into reply bytes. Nothing raised by a handler, panics
//! included, gets past [`Dispatcher::dispatch`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};
use zb_protocol::{Opcode, StatusCode};
use zb_sim::{Scheduler, SharedState};

use crate::config::Timings;
use crate::handlers::{handler_for, Handler, HandlerContext, Reply};

/// Routes requests to handlers against the shared coordinator state
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: SharedState,
    scheduler: Scheduler,
    timings: Arc<Timings>,
}

impl Dispatcher {
    pub fn new(state: SharedState, scheduler: Scheduler, timings: Timings) -> Self {
        Self {
            state,
            scheduler,
            timings: Arc::new(timings),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Handle one request and produce its reply
    ///
    /// The state lock is held only while the handler runs.
    pub fn dispatch(&self, opcode: u8, params: &[u8]) -> Reply {
        let Ok(opcode) = Opcode::try_from(opcode) else {
            warn!("Unknown command: 0x{:02X}", opcode);
            return Reply::status(StatusCode::CommandNotSupported);
        };

        debug!("Command {} with {} parameter bytes", opcode, params.len());

        if !opcode.param_rule().accepts(params.len()) {
            warn!(
                "{}: invalid parameter length {} (expected {})",
                opcode.name(),
                params.len(),
                opcode.param_rule()
            );
            return Reply::status(StatusCode::InvalidParameters);
        }

        self.run_guarded(opcode, handler_for(opcode), params)
    }

    fn run_guarded(&self, opcode: Opcode, handler: Handler, params: &[u8]) -> Reply {
        let mut state = self.state.lock();
        let mut ctx = HandlerContext {
            state: &mut state,
            scheduler: &self.scheduler,
            timings: &self.timings,
        };

        match catch_unwind(AssertUnwindSafe(|| handler(params, &mut ctx))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!("{} failed: {}", opcode.name(), e);
                Reply::status(e.status())
            }
            Err(_) => {
                error!("Error in command handler 0x{:02X}", opcode.as_u8());
                Reply::status(StatusCode::NetworkError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerResult;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use zb_sim::{demo_nodes, CoordinatorState, ExtendedPanId, NetworkConfig};

    fn dispatcher() -> Dispatcher {
        let mut rng = StdRng::seed_from_u64(17);
        let network = NetworkConfig::new(0x1234, 11, ExtendedPanId([0; 8]), true).unwrap();
        let state = CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap();
        let (scheduler, _worker) = Scheduler::channel();
        Dispatcher::new(SharedState::new(state), scheduler, Timings::default())
    }

    #[test]
    fn test_unknown_opcode() {
        let d = dispatcher();
        for opcode in [0x02, 0x42, 0xFE] {
            assert_eq!(d.dispatch(opcode, &[]).bytes, vec![0x03]);
        }
    }

    #[test]
    fn test_length_mismatch_changes_nothing() {
        let d = dispatcher();

        assert_eq!(d.dispatch(0x05, &[0, 0, 0, 0, 0, 0, 0]).bytes, vec![0x01]);
        assert_eq!(d.dispatch(0x05, &[0, 0, 0, 0, 0, 0, 0, 1, 9]).bytes, vec![0x01]);
        assert_eq!(d.state().lock().registry.len(), 5);

        assert_eq!(d.dispatch(0x08, &[]).bytes, vec![0x01]);
        assert_eq!(d.dispatch(0x08, &[0, 0]).bytes, vec![0x01]);
        assert!(d.state().lock().network.permit_joining());

        assert_eq!(d.dispatch(0x07, &[0x00]).bytes, vec![0x01]);
        assert_eq!(d.dispatch(0xAB, &[0; 7]).bytes, vec![0x01]);
        assert_eq!(d.dispatch(0x1B, &[0; 8]).bytes, vec![0x01]);
    }

    #[test]
    fn test_remove_then_lookup() {
        let d = dispatcher();
        let addr = 5u64.to_be_bytes();

        assert_eq!(d.dispatch(0x05, &addr).bytes, vec![0x00]);
        assert_eq!(d.dispatch(0x05, &addr).bytes, vec![0x02]);
        assert_eq!(d.dispatch(0x19, &addr).bytes, vec![0x02]);
    }

    #[test]
    fn test_handler_panic_becomes_network_error() {
        fn exploding(_params: &[u8], _ctx: &mut HandlerContext<'_>) -> HandlerResult {
            panic!("handler bug");
        }

        let d = dispatcher();
        let reply = d.run_guarded(Opcode::GetAllNodes, exploding, &[]);
        assert_eq!(reply.bytes, vec![0x04]);

        // The state stays usable after the panic
        assert_eq!(d.dispatch(0x0C, &[]).bytes.len(), 1 + 5 * 9);
    }

    #[test]
    fn test_scheduling_without_worker_is_network_error() {
        // The worker end was dropped in `dispatcher()`
        let d = dispatcher();
        assert_eq!(d.dispatch(0x06, &1u64.to_be_bytes()).bytes, vec![0x04]);
        assert!(d.state().lock().registry.get(zb_protocol::LongAddress(1)).unwrap().is_online());
    }
}
