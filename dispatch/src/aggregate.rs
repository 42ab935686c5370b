use plex_types::{Envelope, Outcome};

use crate::{CompletionEntry, CompletionState};

/// Response envelope for `request` from the current completion state.
///
/// Entries follow request order. Slots still pending become timed out.
#[must_use]
pub fn aggregate(request: &Envelope, state: &CompletionState) -> Envelope {
    let entries = state.snapshot();
    let replies = request
        .requests()
        .iter()
        .zip(entries)
        .map(|(sub, entry)| match entry {
            CompletionEntry::Succeeded(output) => sub.respond(Outcome::Succeeded, Some(output)),
            CompletionEntry::Failed(fault) => sub.respond(Outcome::Failed(fault), None),
            CompletionEntry::Pending => sub.respond(Outcome::TimedOut, None),
        })
        .collect();
    request.respond(replies)
}
