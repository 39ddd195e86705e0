//! Property tests for control block and timeout translation.

use proptest::prelude::*;
use serial_line::line::control::{flags, XOFF_CHAR, XON_CHAR, XON_XOFF_LIMIT};
use serial_line::line::{CommTimeouts, ControlBlock, LineConfig, Parity, StopBits};

fn any_parity() -> impl Strategy<Value = Parity> {
    prop::sample::select(Parity::ALL.to_vec())
}

fn any_stop_bits() -> impl Strategy<Value = StopBits> {
    prop::sample::select(StopBits::ALL.to_vec())
}

prop_compose! {
    fn any_config()(
        baud_rate in 1u32..=4_000_000,
        byte_size in 5u8..=8,
        parity in any_parity(),
        stop_bits in any_stop_bits(),
        read_ms in 0u32..u32::MAX,
        write_ms in 0u32..u32::MAX,
    ) -> LineConfig {
        LineConfig::builder()
            .baud_rate(baud_rate)
            .byte_size(byte_size)
            .parity(parity)
            .stop_bits(stop_bits)
            .read_timeout_ms(read_ms)
            .write_timeout_ms(write_ms)
            .build()
            .unwrap()
    }
}

prop_compose! {
    fn any_snapshot()(
        baud_rate: u32,
        flags: u32,
        reserved: u16,
        (xon_lim, xoff_lim) in any::<(u16, u16)>(),
        (byte_size, parity, stop_bits) in any::<(u8, u8, u8)>(),
        (xon_char, xoff_char, error_char, eof_char, evt_char) in any::<(u8, u8, u8, u8, u8)>(),
        reserved1: u16,
    ) -> ControlBlock {
        ControlBlock {
            length: 0,
            baud_rate,
            flags,
            reserved,
            xon_lim,
            xoff_lim,
            byte_size,
            parity,
            stop_bits,
            xon_char,
            xoff_char,
            error_char,
            eof_char,
            evt_char,
            reserved1,
        }
    }
}

proptest! {
    #[test]
    fn parity_bit_follows_parity(config in any_config(), snapshot in any_snapshot()) {
        let mut block = snapshot;
        block.apply(&config);
        prop_assert_eq!(block.parity_enabled(), config.parity() != Parity::None);
        prop_assert_eq!(block.parity, config.parity().code());
        prop_assert_eq!(block.stop_bits, config.stop_bits().code());
    }

    #[test]
    fn handshake_policy_is_fixed(config in any_config(), snapshot in any_snapshot()) {
        let mut block = snapshot;
        block.apply(&config);
        prop_assert!(block.is_binary());
        prop_assert!(block.cts_output_flow());
        prop_assert!(block.dsr_output_flow());
        prop_assert!(block.abort_on_error());
        prop_assert_eq!(block.dtr_control(), flags::CONTROL_HANDSHAKE);
        prop_assert_eq!(block.rts_control(), flags::CONTROL_HANDSHAKE);
        prop_assert_eq!((block.xon_char, block.xoff_char), (XON_CHAR, XOFF_CHAR));
        prop_assert_eq!((block.xon_lim, block.xoff_lim), (XON_XOFF_LIMIT, XON_XOFF_LIMIT));
        prop_assert_eq!(block.length, 28);
    }

    #[test]
    fn unowned_fields_survive(config in any_config(), snapshot in any_snapshot()) {
        let mut block = snapshot;
        block.apply(&config);
        prop_assert_eq!(block.flags & !flags::OWNED, snapshot.flags & !flags::OWNED);
        prop_assert_eq!(block.reserved, snapshot.reserved);
        prop_assert_eq!(block.reserved1, snapshot.reserved1);
        prop_assert_eq!(block.error_char, snapshot.error_char);
        prop_assert_eq!(block.eof_char, snapshot.eof_char);
        prop_assert_eq!(block.evt_char, snapshot.evt_char);
    }

    #[test]
    fn applying_twice_changes_nothing(config in any_config(), snapshot in any_snapshot()) {
        let mut once = snapshot;
        once.apply(&config);
        let mut twice = once;
        twice.apply(&config);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn timeouts_carry_constants_only(read_ms in 0u32..u32::MAX, write_ms in 0u32..u32::MAX) {
        let timeouts = CommTimeouts::new(read_ms, write_ms);
        prop_assert_eq!(timeouts.read_interval_timeout, u32::MAX);
        prop_assert_eq!(timeouts.read_total_timeout_multiplier, 0);
        prop_assert_eq!(timeouts.write_total_timeout_multiplier, 0);
        prop_assert_eq!(timeouts.read_total_timeout_constant, read_ms);
        prop_assert_eq!(timeouts.write_total_timeout_constant, write_ms);
    }
}
