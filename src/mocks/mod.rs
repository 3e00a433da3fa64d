pub mod mock_sensor;

pub use mock_sensor::MockSensor;
