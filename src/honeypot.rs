//! Honeypot sensor
//!
//! The portal renders a concealed input that is unreachable by keyboard
//! navigation and carries no visible affordance. Automated form-fillers
//! populate it anyway. The sensor reads the field synchronously at the
//! moment a verification payload is composed; it is never bound to a
//! listener. The engine forwards the reading verbatim and lets the scoring
//! service apply the verdict.

use std::sync::{Arc, Mutex};

/// Handle to the rendered trap field, injected at construction.
///
/// The click flag is reserved for a future bait-element interaction
/// detector; nothing produces it today and the shipped implementations
/// never set it.
pub trait HoneypotField: Send {
    /// Current field value; empty string if untouched
    fn value(&self) -> String;

    /// Whether the bait element has been clicked
    fn clicked(&self) -> bool;
}

/// Snapshot taken at payload-composition time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoneypotRead {
    pub value: String,
    pub clicked: bool,
}

impl HoneypotRead {
    /// True when the field carries any bot signal
    pub fn tripped(&self) -> bool {
        !self.value.is_empty() || self.clicked
    }
}

/// Reads the injected field on demand
pub struct HoneypotSensor {
    field: Box<dyn HoneypotField>,
}

impl HoneypotSensor {
    pub fn new(field: Box<dyn HoneypotField>) -> Self {
        Self { field }
    }

    /// Sensor over a field that always reads empty, for hosts that render
    /// no trap (and for replay tooling)
    pub fn inert() -> Self {
        Self::new(Box::new(SharedHoneypotField::new()))
    }

    /// Read the field now
    pub fn read(&self) -> HoneypotRead {
        HoneypotRead {
            value: self.field.value(),
            clicked: self.field.clicked(),
        }
    }
}

#[derive(Debug, Default)]
struct FieldState {
    value: String,
    clicked: bool,
}

/// In-memory trap field. The embedding host mirrors the rendered input's
/// value into it; the sensor side only ever reads.
#[derive(Debug, Clone, Default)]
pub struct SharedHoneypotField {
    state: Arc<Mutex<FieldState>>,
}

impl SharedHoneypotField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the rendered field's current value
    pub fn set_value(&self, value: impl Into<String>) {
        self.lock().value = value.into();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FieldState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HoneypotField for SharedHoneypotField {
    fn value(&self) -> String {
        self.lock().value.clone()
    }

    fn clicked(&self) -> bool {
        self.lock().clicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_field_reads_clean() {
        let sensor = HoneypotSensor::inert();
        let read = sensor.read();
        assert_eq!(read.value, "");
        assert!(!read.clicked);
        assert!(!read.tripped());
    }

    #[test]
    fn test_filled_field_trips() {
        let field = SharedHoneypotField::new();
        let sensor = HoneypotSensor::new(Box::new(field.clone()));

        field.set_value("I am a bot");

        let read = sensor.read();
        assert_eq!(read.value, "I am a bot");
        assert!(read.tripped());
    }

    #[test]
    fn test_read_is_a_snapshot() {
        let field = SharedHoneypotField::new();
        let sensor = HoneypotSensor::new(Box::new(field.clone()));

        let before = sensor.read();
        field.set_value("filled later");
        let after = sensor.read();

        assert!(!before.tripped());
        assert!(after.tripped());
    }

    #[test]
    fn test_click_flag_never_produced() {
        let field = SharedHoneypotField::new();
        field.set_value("anything");
        // No producer exists for the click trap; the flag stays false.
        assert!(!field.clicked());
    }
}
