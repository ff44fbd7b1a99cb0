//! Turning captured exception info into events.

use jobwatch_core::ExcInfo;
use jobwatch_core::exc::OPAQUE_ERROR_TYPE;

use crate::event::{Event, Exception, Hint, Level, Mechanism};
use crate::options::ClientOptions;

/// Build an error event for `exc_info`.
///
/// The exception list is ordered innermost cause first; the mechanism is
/// attached to the outermost error, the one that was actually raised.
pub fn event_from_exception(
    exc_info: &ExcInfo,
    options: &ClientOptions,
    mechanism: Option<Mechanism>,
) -> (Event, Hint) {
    let mut exception: Vec<Exception> = exc_info
        .chain()
        .take(options.max_exception_chain.max(1))
        .enumerate()
        .map(|(depth, err)| Exception {
            ty: if depth == 0 {
                exc_info.type_name().to_string()
            } else {
                OPAQUE_ERROR_TYPE.to_string()
            },
            value: err.to_string(),
            mechanism: None,
        })
        .collect();

    if let Some(outermost) = exception.first_mut() {
        outermost.mechanism = mechanism;
    }
    exception.reverse();

    let event = Event {
        level: Level::Error,
        exception,
        ..Default::default()
    };
    (event, Hint::with_exc_info(exc_info.clone()))
}
