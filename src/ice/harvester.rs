use std::{
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    ice::stun_ice_engine::StunIceEngine,
    log::log_sink::LogSink,
    scheduler::{PeriodicExecutor, TaskControl, TaskHandle},
    sink_debug, sink_trace, sink_warn,
    transport::DatagramSink,
};

/// Schedules periodic binding requests to every remote candidate.
///
/// The task ends by itself once a candidate is selected or the sink is gone;
/// the returned handle cancels it earlier.
pub fn start_harvester(
    executor: &PeriodicExecutor,
    engine: Arc<StunIceEngine>,
    sink: Weak<dyn DatagramSink>,
    remote_candidates: Vec<SocketAddr>,
    interval: Duration,
    logger: Arc<dyn LogSink>,
) -> TaskHandle {
    sink_debug!(
        logger,
        "[ICE] harvesting {} candidate(s) every {:?}",
        remote_candidates.len(),
        interval
    );
    executor.schedule(Duration::ZERO, interval, move || {
        if engine.is_selected() {
            sink_trace!(logger, "[ICE] candidate selected, harvester done");
            return TaskControl::Stop;
        }
        let Some(sink) = sink.upgrade() else {
            return TaskControl::Stop;
        };
        for addr in &remote_candidates {
            match engine.connectivity_check() {
                Ok(request) => {
                    if let Err(e) = sink.send_to(&request, *addr) {
                        sink_debug!(logger, "[ICE] check to {} not sent: {}", addr, e);
                    }
                }
                Err(e) => {
                    sink_warn!(logger, "[ICE] cannot build binding request: {}", e);
                    return TaskControl::Stop;
                }
            }
        }
        TaskControl::Continue
    })
}
