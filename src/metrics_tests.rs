// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for metrics registration and encoding.

#[cfg(test)]
mod tests {
    use crate::metrics::{
        gather_metrics, record_dead_letter, record_peer_sync, record_zone_save, set_queue_depth,
    };

    #[test]
    fn test_gather_includes_recorded_metrics() {
        record_zone_save("bind-local", true);
        record_zone_save("bind-local", false);
        record_dead_letter("write");
        record_peer_sync(true);
        set_queue_depth("save", 3);

        let text = gather_metrics().unwrap();
        assert!(text.contains("zonegate_zone_saves_total"));
        assert!(text.contains("zonegate_dead_letters_total"));
        assert!(text.contains("zonegate_peer_syncs_total"));
        assert!(text.contains("zonegate_queue_depth"));
    }
}
