mod get_server_status;

pub use get_server_status::GetServerStatusTool;
