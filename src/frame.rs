/// 802.11 frame classifier for passive capture.
///
/// Only data frames carry the station → AP relationship we care about.
/// The ieee80211 crate reads the frame control field and the addresses of
/// the data-frame MAC header:
///
/// ```text
/// 0      2        4       10      16      22     24
/// | FC   | dur/id | addr1 | addr2 | addr3 | seq  |
/// ```
///
/// addr2 is the transmitting station, addr3 the BSSID.
use ieee80211::common::FrameType;
use ieee80211::GenericFrame;

/// Length of the fixed part of a data-frame MAC header.
pub const DATA_HEADER_LEN: usize = 24;

/// Frame category as declared by the radio driver alongside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Management,
    Control,
    Data,
    Misc,
}

/// A station seen transmitting toward an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub ap: [u8; 6],
    pub station: [u8; 6],
}

/// Classify a captured frame.
///
/// Returns `None` unless the driver declared a data frame, the frame-control
/// type bits agree, and the buffer holds a full data header.
///
/// Safe to call from ISR context (no allocation, no blocking).
pub fn classify(frame: &[u8], declared: FrameKind) -> Option<Observation> {
    if declared != FrameKind::Data || frame.len() < DATA_HEADER_LEN {
        return None;
    }
    let header = GenericFrame::new(frame, false).ok()?;
    if !matches!(header.frame_control_field().frame_type(), FrameType::Data(_)) {
        return None;
    }
    Some(Observation {
        ap: header.address_3()?.0,
        station: header.address_2()?.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AP: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    const STA: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01];

    /// Build a data-frame header with the given frame-control byte.
    fn header(fc0: u8) -> [u8; DATA_HEADER_LEN] {
        let mut f = [0u8; DATA_HEADER_LEN];
        f[0] = fc0;
        f[4..10].copy_from_slice(&[0xFF; 6]);
        f[10..16].copy_from_slice(&STA);
        f[16..22].copy_from_slice(&AP);
        f
    }

    #[test]
    fn data_frame_yields_bssid_and_transmitter() {
        let f = header(0x08);
        let obs = classify(&f, FrameKind::Data).unwrap();
        assert_eq!(obs.ap, AP);
        assert_eq!(obs.station, STA);
    }

    #[test]
    fn qos_data_subtype_is_still_data() {
        // QoS data: type 2, subtype 8 → 0x88
        let mut f = [0u8; 64];
        f[..DATA_HEADER_LEN].copy_from_slice(&header(0x88));
        let obs = classify(&f, FrameKind::Data).unwrap();
        assert_eq!(obs.ap, AP);
    }

    #[test]
    fn to_ds_flag_keeps_address_layout() {
        // Station → AP uplink: FC byte 1 has ToDS set
        let mut f = header(0x08);
        f[1] = 0x01;
        let obs = classify(&f, FrameKind::Data).unwrap();
        assert_eq!(obs.ap, AP);
        assert_eq!(obs.station, STA);
    }

    #[test]
    fn control_frame_bits_are_rejected_even_if_declared_data() {
        // RTS: type 1, subtype 11 → 0xB4
        let f = header(0xB4);
        assert!(classify(&f, FrameKind::Data).is_none());
    }

    #[test]
    fn management_frame_is_not_applicable() {
        // Beacon: type 0, subtype 8 → 0x80
        let f = header(0x80);
        assert!(classify(&f, FrameKind::Management).is_none());
    }

    #[test]
    fn declared_type_must_agree_with_frame_control() {
        let beacon = header(0x80);
        assert!(classify(&beacon, FrameKind::Data).is_none());

        let data = header(0x08);
        assert!(classify(&data, FrameKind::Misc).is_none());
        assert!(classify(&data, FrameKind::Control).is_none());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let f = header(0x08);
        for len in 0..DATA_HEADER_LEN {
            assert!(classify(&f[..len], FrameKind::Data).is_none(), "len {len}");
        }
    }

    #[test]
    fn empty_buffer_does_not_panic() {
        assert!(classify(&[], FrameKind::Data).is_none());
    }
}
