use courier_common::Response;

use crate::error::TransformError;

/// User supplied post-processing of a destination's response
///
/// Runs after the send and before the message's final status is decided; it
/// may rewrite any part of the response, status included.
pub trait ResponseTransformer: Send + Sync {
    /// # Errors
    /// If the transformation fails; the response is then marked as an error
    fn transform(&self, response: &mut Response) -> Result<(), TransformError>;
}

impl<F> ResponseTransformer for F
where
    F: Fn(&mut Response) -> Result<(), TransformError> + Send + Sync,
{
    fn transform(&self, response: &mut Response) -> Result<(), TransformError> {
        self(response)
    }
}

#[cfg(test)]
mod tests {
    use courier_common::Status;

    use super::*;

    #[test]
    fn closures_are_transformers() {
        let filter_empty = |response: &mut Response| {
            if response.message.is_none() {
                response.status = Status::Filtered;
            }
            Ok::<(), TransformError>(())
        };

        let mut response = Response::sent();
        assert!(filter_empty.transform(&mut response).is_ok());
        assert_eq!(response.status, Status::Filtered);
    }
}
