use courier_common::{Response, Status};

/// The status a destination actually ends a send with
///
/// Only `FILTERED`, `ERROR`, `SENT` and `QUEUED` are meaningful once a send is
/// over; anything else a sender or transformer reports becomes `ERROR`. A
/// `QUEUED` outcome is also an `ERROR` when the destination has no queue,
/// since nothing would ever retry it.
#[must_use]
pub fn normalize_status(status: Status, queue_enabled: bool) -> Status {
    if !status.is_valid_destination_status() || (status == Status::Queued && !queue_enabled) {
        Status::Error
    } else {
        status
    }
}

/// Apply [`normalize_status`] to a response in place
pub fn normalize_response(response: &mut Response, queue_enabled: bool) {
    response.status = normalize_status(response.status, queue_enabled);
}
