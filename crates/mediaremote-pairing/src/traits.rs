//! Transport capability for carrying pairing TLVs.

use async_trait::async_trait;
use mediaremote_core::error::Result;

/// Carrier for pairing exchanges.
///
/// The engines hand a TLV record to the transport and expect the peer's TLV
/// record back. The AirPlay implementation POSTs to `/pair-setup` and
/// `/pair-verify`; the Companion implementation wraps the bytes in a
/// compact-pack envelope inside `PS_*`/`PV_*` frames. `first` marks the
/// opening message of an exchange, which Companion frames differently.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PairingTransport: Send {
    /// Trigger PIN display before pair-setup. AirPlay POSTs
    /// `/pair-pin-start`; Companion has no equivalent and does nothing.
    async fn pin_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Send one pair-setup TLV and return the peer's reply TLV.
    async fn send_setup(&mut self, first: bool, tlv: &[u8]) -> Result<Vec<u8>>;

    /// Send one pair-verify TLV and return the peer's reply TLV.
    async fn send_verify(&mut self, first: bool, tlv: &[u8]) -> Result<Vec<u8>>;
}
