//! `Record` implementations for the persisted models.

use super::Record;
use crate::model::{Annotation, Bundle, Cycle, NodeMeta, RecordKind, RecordMeta, Revision};
use crate::validate::{self, ValidationError};

macro_rules! impl_record {
    ($ty:ty, $kind:expr, $validator:path) => {
        impl Record for $ty {
            const KIND: RecordKind = $kind;
            const SCHEMA_VERSION: u32 = <$ty>::SCHEMA_VERSION;

            fn meta(&self) -> &RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut RecordMeta {
                &mut self.meta
            }

            fn validate(&self) -> Result<(), ValidationError> {
                $validator(self)
            }
        }
    };
}

impl_record!(Annotation, RecordKind::Annotation, validate::validate_annotation);
impl_record!(Cycle, RecordKind::Cycle, validate::validate_cycle);
impl_record!(Bundle, RecordKind::Bundle, validate::validate_bundle);
impl_record!(Revision, RecordKind::Revision, validate::validate_revision);

impl Record for NodeMeta {
    const KIND: RecordKind = RecordKind::NodeMeta;
    const SCHEMA_VERSION: u32 = NodeMeta::SCHEMA_VERSION;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn derive_id(&self) -> String {
        Self::id_for(&self.node_id)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate::validate_node_meta(self)
    }
}
