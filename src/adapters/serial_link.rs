//! Wireless serial-link adapter.
//!
//! The short-range radio is an off-board transparent-UART module (HM-10
//! class): the firmware sees a plain serial port and the module's own
//! stack handles advertising, pairing, and the air interface. This
//! adapter implements [`LinkPort`] over UART1 with zero-timeout reads,
//! so neither direction can block the control loop.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: UART1 via the IDF driver (installed by `init`).
//! On host/test: in-memory TX log and RX injection buffer.

use crate::app::ports::LinkPort;
use crate::error::LinkError;
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const LINK_UART: u32 = 1;
#[cfg(target_os = "espidf")]
const LINK_BAUD: u32 = 115_200;
#[cfg(target_os = "espidf")]
const UART_RX_RING: i32 = 512;

pub struct SerialLinkAdapter {
    #[cfg(not(target_os = "espidf"))]
    tx_log: Vec<String>,
    #[cfg(not(target_os = "espidf"))]
    rx_pending: Vec<u8>,
}

impl SerialLinkAdapter {
    /// Install the UART driver and configure the link pins.
    pub fn new() -> Result<Self, LinkError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from main before the control loop;
            // UART1 is not touched anywhere else.
            unsafe {
                let cfg = uart_config_t {
                    baud_rate: LINK_BAUD as i32,
                    data_bits: uart_word_length_t_UART_DATA_8_BITS,
                    parity: uart_parity_t_UART_PARITY_DISABLE,
                    stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
                    flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                    ..Default::default()
                };
                if uart_param_config(LINK_UART, &cfg) != ESP_OK {
                    return Err(LinkError::NotConnected);
                }
                uart_set_pin(
                    LINK_UART,
                    pins::UART_TX_GPIO,
                    pins::UART_RX_GPIO,
                    -1,
                    -1,
                );
                if uart_driver_install(LINK_UART, UART_RX_RING, 0, 0, core::ptr::null_mut(), 0)
                    != ESP_OK
                {
                    return Err(LinkError::NotConnected);
                }
            }
            info!("serial link: UART1 up at {LINK_BAUD} baud");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("serial link: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            tx_log: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            rx_pending: Vec::new(),
        })
    }

    /// Host-only: inject inbound bytes as if the radio delivered them.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_inject_rx(&mut self, bytes: &[u8]) {
        self.rx_pending.extend_from_slice(bytes);
    }

    /// Host-only: frames transmitted so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_sent(&self) -> &[String] {
        &self.tx_log
    }
}

impl LinkPort for SerialLinkAdapter {
    #[cfg(target_os = "espidf")]
    fn try_send(&mut self, line: &str) -> Result<(), LinkError> {
        // SAFETY: driver installed in new(); uart_write_bytes copies the
        // buffer into the TX ring and returns immediately.
        let written = unsafe {
            uart_write_bytes(LINK_UART, line.as_ptr().cast(), line.len())
        };
        if written < 0 || written as usize != line.len() {
            return Err(LinkError::TxFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn try_send(&mut self, line: &str) -> Result<(), LinkError> {
        self.tx_log.push(line.to_string());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn poll_rx(&mut self, buf: &mut [u8]) -> usize {
        // SAFETY: zero timeout — returns whatever is already buffered.
        let n = unsafe {
            uart_read_bytes(LINK_UART, buf.as_mut_ptr().cast(), buf.len() as u32, 0)
        };
        n.max(0) as usize
    }

    #[cfg(not(target_os = "espidf"))]
    fn poll_rx(&mut self, buf: &mut [u8]) -> usize {
        let n = self.rx_pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.rx_pending[..n]);
        self.rx_pending.drain(..n);
        n
    }
}
