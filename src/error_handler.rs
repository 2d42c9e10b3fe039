use crate::input::PlanId;
use crate::ledger::TransferError;

use std::sync::mpsc::Receiver;

// Failed transfers are streamed here while the workers are still running.
//
// Insufficient funds or a failed prerequisite are normal outcomes, and are
// only worth a warning. An unreconciled ledger is not: it is logged as an
// error so that it can't go unnoticed.
//
// The returned thread yields how many transfers failed, once every sender is
// gone.
pub fn report(failures: Receiver<(PlanId, TransferError)>) -> std::thread::JoinHandle<usize> {
    std::thread::spawn(move || {
        let mut count = 0;
        for (plan_id, err) in failures {
            count += 1;
            if err.is_fatal() {
                tracing::error!(plan_id, %err, "transfer left the ledger inconsistent");
            } else {
                tracing::warn!(plan_id, %err, "transfer not applied");
            }
        }

        count
    })
}
