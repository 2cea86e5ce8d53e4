pub mod http_batch;
pub mod inbox_dir;

pub use http_batch::batch_id_for_payload;
pub use inbox_dir::InboxDirSource;
