//! # `ar9170-fw`
//! Control firmware core for AR9170-style USB 802.11n devices.
//!
//! The device moves every frame through on-chip DMA descriptor rings. The
//! host pushes superframes down one ring, the firmware routes them onto one
//! of five hardware TX queues, services retries, block-ack replies and
//! buffered multicast, and hands received frames back up another ring. This
//! crate is that routing layer: [`Firmware`] owns the descriptor
//! [`Arena`](dma::Arena) and all per-queue state, and [`Firmware::tick`]
//! runs one pass of the interrupt dispatch loop.
//!
//! Hardware access goes through the [`Mmio`] trait and completed host
//! transfers leave through [`HostTransport`], so the whole state machine
//! runs unmodified on the target and under host-side tests.
//!
//! Logging goes through either `defmt` or `log`, selected by the mutually
//! exclusive feature flags of the same names.

#![cfg_attr(not(test), no_std)]
pub(crate) mod fmt;

pub mod config;
pub mod dma;
pub mod fw;
pub mod hostif;
pub mod mmio;
pub mod regs;
pub mod superframe;
pub mod txstatus;
pub mod wire;
pub mod wlan;
pub mod wlan_rx;
pub mod wlan_tx;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use dma::{Arena, BufId, DescId, DmaQueue, Owner};
pub use fw::{CabTrigger, CpuClock, Firmware, FwError, FwResult, FwTxCallback};
pub use hostif::{HostTransport, ResponseTag};
pub use mmio::Mmio;
pub use superframe::{RateInfo, SuperFrame, TxMacCtrl, TxPhyCtrl};
pub use txstatus::TxStatus;
