use std::fmt::{self, Display, Formatter};

use crate::record::{CargoForm, FieldViolation};

use super::painter::Painter;
use super::table::Table;

/// Renders the eight record fields with their display labels.
pub(crate) struct RecordView<'a> {
    form: &'a CargoForm,
    painter: &'a Painter,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(form: &'a CargoForm, painter: &'a Painter) -> Self {
        Self { form, painter }
    }
}

impl Display for RecordView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .form
            .fields()
            .map(|(field, value)| (field.label(), self.painter.value(value)))
            .collect();
        write!(f, "{}", Table::key_value(self.painter, rows))
    }
}

/// Renders validation failures, one line per field.
pub(crate) struct ViolationsView<'a> {
    violations: &'a [FieldViolation],
    painter: &'a Painter,
}

impl<'a> ViolationsView<'a> {
    pub(crate) fn new(violations: &'a [FieldViolation], painter: &'a Painter) -> Self {
        Self {
            violations,
            painter,
        }
    }
}

impl Display for ViolationsView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.painter.failure(format!(
                "record has {} invalid field(s):",
                self.violations.len()
            ))
        )?;
        for violation in self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}
