//! Best-effort write of one consultation per request.

use simap_core::consultation::{ConsultationStore, NewConsultation};
use std::sync::Arc;
use tracing::{error, info};

pub struct ConsultationPersister {
    store: Arc<dyn ConsultationStore>,
}

impl ConsultationPersister {
    pub fn new(store: Arc<dyn ConsultationStore>) -> Self {
        Self { store }
    }

    /// Store `record` and return its id. `answer_is_empty` is derived from
    /// the answer text. A failed write is logged with the full payload and
    /// yields `None`; it never fails the request.
    pub async fn persist(&self, mut record: NewConsultation) -> Option<i64> {
        record.answer_is_empty = NewConsultation::is_empty_answer(&record.answer);

        match self.store.insert(&record).await {
            Ok(id) => {
                info!(
                    id_consulta = id,
                    user_id = record.user_id,
                    answer_is_empty = record.answer_is_empty,
                    error_detected = record.error_detected,
                    "Consultation persisted"
                );
                Some(id)
            }
            Err(e) => {
                let payload = serde_json::to_string_pretty(&record).unwrap_or_default();
                error!("Failed to persist consultation: {e}\n{payload}");
                None
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn ConsultationStore> {
        &self.store
    }
}
