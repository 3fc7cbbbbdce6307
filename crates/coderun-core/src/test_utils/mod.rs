pub mod fake_engine;
pub mod mock_judge0_server;
