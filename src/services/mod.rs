pub mod task_service;

pub use task_service::{
    task_service_from_config, DatabaseTaskService, StubTaskService, TaskService,
};
