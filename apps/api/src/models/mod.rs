pub mod assignment;
pub mod background_check;
pub mod call_record;
pub mod consultant;
pub mod email;
pub mod kpi;
pub mod profile;
pub mod task;
pub mod template;
