mod app;
mod cli;
mod error;
mod hw;
mod record;
mod registry;
mod session;
mod telemetry;
mod terminal;

pub use app::{fake_hardware_client, real_hardware_client, run, run_with_clients};
pub use cli::{
    Args, Command, FakeArgs, LogLevel, OutputFormat, ProfileArgs, ReadArgs, RunOptions, WriteArgs,
};
pub use error::{FixtureError, InteractionError, RegistryError, SessionError};
pub use hw::{CharacteristicWrite, DeviceSession, DiscoveredDevice, FakeTransportProbe, HardwareClient};
pub use record::{
    CargoField, CargoForm, CargoRecord, FieldViolation, MAX_TEXT_FIELD_CHARS,
    MISSING_FIELD_SENTINEL, ViolationReason,
};
pub use registry::{DEFAULT_PROFILE_ID, DeviceProfile, DeviceRegistry};
pub use session::{ReadOutcome, SessionController, SessionPolicy, SessionSnapshot, SessionState};
pub use terminal::TerminalClient;
