pub mod sqlite_task_log_repository;

pub use sqlite_task_log_repository::SqliteTaskLogRepository;
