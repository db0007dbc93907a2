//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Upload job lifecycle status.
    UploadStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
        PartiallyFailed = 5,
    }
}

define_status_enum! {
    /// Durable queue entry status.
    QueueJobStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
        Retrying = 5,
    }
}

impl UploadStatus {
    /// Terminal outcome for a finished ingestion run.
    pub fn from_outcome(outcome: tally_core::stats::JobOutcome) -> Self {
        match outcome {
            tally_core::stats::JobOutcome::Completed => Self::Completed,
            tally_core::stats::JobOutcome::PartiallyFailed => Self::PartiallyFailed,
            tally_core::stats::JobOutcome::Failed => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::stats::JobOutcome;

    #[test]
    fn upload_status_ids_match_seed_data() {
        assert_eq!(UploadStatus::Pending.id(), 1);
        assert_eq!(UploadStatus::Processing.id(), 2);
        assert_eq!(UploadStatus::Completed.id(), 3);
        assert_eq!(UploadStatus::Failed.id(), 4);
        assert_eq!(UploadStatus::PartiallyFailed.id(), 5);
    }

    #[test]
    fn queue_status_ids_match_seed_data() {
        assert_eq!(QueueJobStatus::Pending.id(), 1);
        assert_eq!(QueueJobStatus::Running.id(), 2);
        assert_eq!(QueueJobStatus::Completed.id(), 3);
        assert_eq!(QueueJobStatus::Failed.id(), 4);
        assert_eq!(QueueJobStatus::Retrying.id(), 5);
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(
            UploadStatus::from_outcome(JobOutcome::Completed),
            UploadStatus::Completed
        );
        assert_eq!(
            UploadStatus::from_outcome(JobOutcome::PartiallyFailed),
            UploadStatus::PartiallyFailed
        );
        assert_eq!(
            UploadStatus::from_outcome(JobOutcome::Failed),
            UploadStatus::Failed
        );
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = UploadStatus::Pending.into();
        assert_eq!(id, 1);
    }
}
