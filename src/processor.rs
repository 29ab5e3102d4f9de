//! Processor - event inbox and session driver
//!
//! A session is driven one [`Event`] at a time. Events come from whatever owns
//! the transports: a socket reactor, an L2CAP stack, or a test. [`run`] is a
//! ready-made async driver that feeds a session from an `embassy-sync` channel
//! and sleeps on a [`Clock`] until the session's next deadline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use avctp::processor::{self, Event, EventChannel};
//!
//! let events: EventChannel<8> = EventChannel::new();
//!
//! // Reactor side: report readiness
//! events.try_send(Event::Readable(ChannelKind::Control)).ok();
//!
//! // Driver task
//! processor::run(&mut session, &events, &mut clock).await;
//! ```
//!
//! # Architecture
//!
//! * **Readable**: one frame is read from the channel and dispatched
//! * **Timers**: request timeouts and key timers are plain deadlines owned by the
//!   session and fired from [`Session::poll`]
//! * **Queue ticks**: deferred until the current event completes
//!
//! The driver returns once the control channel is gone.

use crate::channel::ChannelKind;
use crate::session::Session;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_io::{Read, Write};

/// Input to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A frame can be read from the channel
    Readable(ChannelKind),
    /// The response timeout of a request fired
    RequestTimeout {
        /// Channel of the request
        channel: ChannelKind,
        /// Transaction label of the request
        transaction: u8,
    },
    /// The key auto-release or repeat timer fired
    KeyTimer,
    /// Run the deferred queue tick of a channel
    ProcessQueue(ChannelKind),
    /// Tear the session down
    Shutdown,
}

/// Single-threaded event inbox
pub type EventChannel<const N: usize> = embassy_sync::channel::Channel<NoopRawMutex, Event, N>;

/// Monotonic millisecond clock used by [`run`]
pub trait Clock {
    /// Current time in milliseconds
    fn now_ms(&mut self) -> u64;

    /// Complete once the clock reaches `deadline_ms`
    fn wait_until(&mut self, deadline_ms: u64) -> impl Future<Output = ()>;
}

/// Drive `session` until it shuts down.
///
/// Deferred queue ticks and expired timers are run before waiting for the next
/// event or the next deadline, whichever comes first.
pub async fn run<T, C, const N: usize>(
    session: &mut Session<T>,
    events: &EventChannel<N>,
    clock: &mut C,
) where
    T: Read + Write,
    C: Clock,
{
    info!("[PROCESSOR] AVCTP session driver started");

    while session.is_connected() {
        session.poll(clock.now_ms());
        if !session.is_connected() {
            break;
        }

        let event = match session.next_deadline() {
            Some(deadline) => {
                let outcome = select(events.receive(), clock.wait_until(deadline)).await;
                match outcome {
                    Either::First(event) => Some(event),
                    Either::Second(()) => None,
                }
            }
            None => Some(events.receive().await),
        };

        if let Some(event) = event {
            trace!("[PROCESSOR] event: {:?}", event);
            session.handle_event(event, clock.now_ms());
        }
    }

    info!("[PROCESSOR] AVCTP session driver stopped");
}
