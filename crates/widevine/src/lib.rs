//! A Widevine CDM backed by a device dump (`client_id.bin` and
//! `private_key.pem`, or a `.wvd` file).
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # let pssh_box: Vec<u8> = Vec::new();
//! # let license_response: Vec<u8> = Vec::new();
//! use tsumugi_widevine::{protocol::Message, Device};
//!
//! let device = Device::load_wvd("device.wvd")?;
//! let mut session = device.open();
//! let challenge = session.license_request(&device, &pssh_box)?.encode_to_vec();
//! // POST the challenge to the license server, then:
//! for key in session.parse_license(&device, &license_response)? {
//!     println!("{key}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod key;
pub mod protocol;
pub mod pssh;
pub mod session;

pub use device::Device;
pub use key::WidevineKey;
pub use protocol::KeyType;
pub use session::Session;
