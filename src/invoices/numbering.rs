use rand::Rng;
use time::{macros::format_description, Date};

/// Insert attempts before giving up on finding a free invoice number.
pub const MAX_ATTEMPTS: usize = 5;

/// `INV-YYYYMMDD-NNNN` with a random four digit suffix.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, today: Date) -> String {
    let ymd = today
        .format(format_description!("[year][month][day]"))
        .unwrap_or_default();
    format!("INV-{}-{}", ymd, rng.gen_range(1000..=9999))
}

/// Numbers to try, in order. A caller-supplied number only gets the first slot.
pub fn candidates(requested: Option<&str>, today: Date) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut out = Vec::with_capacity(MAX_ATTEMPTS);
    if let Some(n) = requested.map(str::trim).filter(|n| !n.is_empty()) {
        out.push(n.to_string());
    }
    while out.len() < MAX_ATTEMPTS {
        out.push(generate(&mut rng, today));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use time::macros::date;

    #[test]
    fn numbers_are_date_seeded() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = generate(&mut rng, date!(2025 - 03 - 09));
            assert!(n.starts_with("INV-20250309-"), "{n}");
            let suffix: u32 = n["INV-20250309-".len()..].parse().unwrap();
            assert!((1000..=9999).contains(&suffix));
        }
    }

    #[test]
    fn requested_number_is_tried_first_only() {
        let c = candidates(Some(" INV-CUSTOM-1 "), date!(2025 - 03 - 09));
        assert_eq!(c.len(), MAX_ATTEMPTS);
        assert_eq!(c[0], "INV-CUSTOM-1");
        assert!(c[1..].iter().all(|n| n.starts_with("INV-20250309-")));
    }

    #[test]
    fn blank_request_falls_back_to_generated() {
        let c = candidates(Some("  "), date!(2025 - 03 - 09));
        assert_eq!(c.len(), MAX_ATTEMPTS);
        assert!(c.iter().all(|n| n.starts_with("INV-20250309-")));
    }
}
