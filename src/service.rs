use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::courier::Courier;
use crate::error::CourierError;
use crate::module::Module;

#[derive(Debug, Clone)]
pub struct UpdateJob {
    pub module: Module,
}

/// Fire-and-forget acquisition worker. Jobs are applied one at a time in
/// queue order on a dedicated thread, so update attempts never overlap.
#[derive(Debug)]
pub struct UpdateService {
    sender: Sender<UpdateJob>,
}

impl Clone for UpdateService {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl UpdateService {
    pub fn new(courier: Arc<Courier>) -> Result<Self, CourierError> {
        let (sender, receiver) = unbounded();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CourierError::Internal(format!("build update runtime: {e}")))?;
        thread::spawn(move || worker_loop(receiver, courier, runtime));
        Ok(Self { sender })
    }

    pub fn queue(&self, job: UpdateJob) -> Result<(), CourierError> {
        self.sender
            .send(job)
            .map_err(|_| CourierError::Internal("update worker is gone".into()))
    }
}

fn worker_loop(
    receiver: Receiver<UpdateJob>,
    courier: Arc<Courier>,
    runtime: tokio::runtime::Runtime,
) {
    for job in receiver.iter() {
        let module_id = job.module.id.clone();
        match runtime.block_on(courier.download_and_verify(&job.module)) {
            Ok(()) => info!(module = %module_id, "update applied"),
            Err(e) if e.is_aborted() => info!(module = %module_id, "update aborted"),
            Err(e) => warn!(module = %module_id, error = %e, "update failed"),
        }
    }
}
