//! Host adapter surface.
//!
//! `setup()` performs the process-wide registration work exactly once,
//! however many instances the host creates. `dispatch()` forwards a decoded
//! control message to the matching `NnProcessor` operation; it adds no
//! behaviour of its own.

use std::sync::OnceLock;

use tracing::info;

use crate::{
    engine::NnProcessor,
    error::Result,
    ipc::events::{ControlMessage, OutletEvent},
};

/// Name the processor class is registered under.
pub const CLASS_NAME: &str = "nn~";

/// Control selectors accepted by every instance, in registration order.
pub const SELECTORS: &[&str] = &[
    "enable",
    "reload",
    "set",
    "get",
    "layers",
    "get_weights",
    "set_weights",
];

/// Process-wide class metadata. Initialised once, never torn down.
#[derive(Debug)]
pub struct ClassDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    pub selectors: &'static [&'static str],
}

static CLASS: OnceLock<ClassDescriptor> = OnceLock::new();

/// Register the processor class and print the startup banner.
///
/// Safe to call from every instance constructor; only the first call does
/// any work.
pub fn setup() -> &'static ClassDescriptor {
    CLASS.get_or_init(|| {
        let descriptor = ClassDescriptor {
            name: CLASS_NAME,
            version: env!("CARGO_PKG_VERSION"),
            selectors: SELECTORS,
        };
        info!("{} - {}", descriptor.name, descriptor.version);
        descriptor
    })
}

/// `true` once `setup()` has completed.
pub fn is_initialised() -> bool {
    CLASS.get().is_some()
}

/// Apply one control message to `processor`.
///
/// Queries return their reply as `Some(OutletEvent)`; the same reply is also
/// broadcast to outlet subscribers.
pub fn dispatch(processor: &mut NnProcessor, message: ControlMessage) -> Result<Option<OutletEvent>> {
    match message {
        ControlMessage::Enable { on } => {
            processor.set_enabled(on);
            Ok(None)
        }
        ControlMessage::Reload => processor.reload().map(|()| None),
        ControlMessage::Set { name, args } => processor.set_attribute(&name, &args).map(|()| None),
        ControlMessage::Get { name } => {
            let value = processor.attribute(&name)?;
            Ok(Some(OutletEvent::Attribute { name, value }))
        }
        ControlMessage::Layers => Ok(Some(OutletEvent::Layers {
            names: processor.layers(),
        })),
        ControlMessage::GetWeights { layer } => {
            let weights = processor.layer_weights(&layer)?;
            Ok(Some(OutletEvent::Layer {
                name: layer,
                weights,
            }))
        }
        ControlMessage::SetWeights { layer, weights } => processor
            .set_layer_weights(&layer, &weights)
            .map(|()| None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProcessorConfig;
    use crate::inference::{BackendHandle, StubBackend};
    use crate::ipc::events::ProcessorStatus;

    fn processor() -> NnProcessor {
        NnProcessor::new(
            ProcessorConfig::default(),
            BackendHandle::new(StubBackend::loaded()),
        )
        .expect("processor")
    }

    #[test]
    fn setup_initialises_once() {
        let first = setup();
        let second = setup();
        assert!(std::ptr::eq(first, second));
        assert!(is_initialised());
        assert_eq!(first.name, "nn~");
        assert_eq!(first.selectors.len(), 7);
    }

    #[test]
    fn every_selector_has_a_message() {
        let messages = [
            ControlMessage::Enable { on: true },
            ControlMessage::Reload,
            ControlMessage::Set {
                name: String::new(),
                args: vec![],
            },
            ControlMessage::Get {
                name: String::new(),
            },
            ControlMessage::Layers,
            ControlMessage::GetWeights {
                layer: String::new(),
            },
            ControlMessage::SetWeights {
                layer: String::new(),
                weights: vec![],
            },
        ];
        let selectors: Vec<_> = messages.iter().map(ControlMessage::selector).collect();
        assert_eq!(selectors, SELECTORS);
    }

    #[test]
    fn enable_toggles_bypass() {
        let mut proc = processor();
        dispatch(&mut proc, ControlMessage::Enable { on: false }).unwrap();
        assert_eq!(proc.status(), ProcessorStatus::Disabled);
        dispatch(&mut proc, ControlMessage::Enable { on: true }).unwrap();
        assert_eq!(proc.status(), ProcessorStatus::Running);
    }

    #[test]
    fn set_then_get_round_trips_attribute() {
        let mut proc = processor();
        dispatch(
            &mut proc,
            ControlMessage::Set {
                name: "gain".into(),
                args: vec!["0.75".into()],
            },
        )
        .unwrap();

        let reply = dispatch(
            &mut proc,
            ControlMessage::Get {
                name: "gain".into(),
            },
        )
        .unwrap();
        assert_eq!(
            reply,
            Some(OutletEvent::Attribute {
                name: "gain".into(),
                value: "0.75".into(),
            })
        );
    }

    #[test]
    fn weights_round_trip_through_dispatch() {
        let mut proc = processor();
        dispatch(
            &mut proc,
            ControlMessage::SetWeights {
                layer: "gain.weight".into(),
                weights: vec![3.0],
            },
        )
        .unwrap();

        let reply = dispatch(
            &mut proc,
            ControlMessage::GetWeights {
                layer: "gain.weight".into(),
            },
        )
        .unwrap();
        assert_eq!(
            reply,
            Some(OutletEvent::Layer {
                name: "gain.weight".into(),
                weights: vec![3.0],
            })
        );
    }

    #[test]
    fn unknown_layer_is_an_error_not_a_reply() {
        let mut proc = processor();
        let result = dispatch(
            &mut proc,
            ControlMessage::GetWeights {
                layer: "decoder.7".into(),
            },
        );
        assert!(result.is_err());
    }
}
