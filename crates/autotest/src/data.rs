//! Random test data.
//!
//! [`DataGenerator`] owns its RNG, so a seeded generator reproduces the same
//! sequence on every run:
//!
//! ```ignore
//! let mut data = DataGenerator::seeded(42);
//! let email = data.random_email(None);
//! let order = data.out_trade_no();
//! ```

use crate::result::{AutomationError, AutomationResult};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// ASCII letters and digits
pub const ALPHANUMERIC: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const LOWER_ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
const DIGITS: &str = "0123456789";

const EMAIL_DOMAINS: [&str; 4] = ["example.com", "test.org", "sample.net", "demo.cn"];

const CN_MOBILE_PREFIXES: [&str; 35] = [
    "130", "131", "132", "133", "134", "135", "136", "137", "138", "139", "150", "151", "152",
    "153", "155", "156", "157", "158", "159", "170", "176", "177", "178", "180", "181", "182",
    "183", "184", "185", "186", "187", "188", "189", "198", "199",
];

const CN_SURNAMES: [&str; 20] = [
    "李", "王", "张", "刘", "陈", "杨", "赵", "黄", "周", "吴", "徐", "孙", "胡", "朱", "高",
    "林", "何", "郭", "马", "罗",
];
const CN_GIVEN: [&str; 20] = [
    "伟", "芳", "娜", "敏", "静", "秀", "明", "丽", "强", "林", "洋", "宇", "宁", "建", "文",
    "涛", "琴", "杰", "楠", "凯",
];
const EN_FIRST: [&str; 10] = [
    "James", "John", "Robert", "Michael", "William", "Mary", "Patricia", "Jennifer", "Linda",
    "Elizabeth",
];
const EN_LAST: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Jones", "Brown", "Davis", "Miller", "Wilson", "Moore",
    "Taylor",
];

/// Compact timestamp used in order numbers and expiry times
pub const COMPACT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// How long a freshly created order stays payable
pub const TRADE_EXPIRY_MINUTES: i64 = 30;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// Dotted quad
    V4,
    /// Eight hex groups
    V6,
}

/// Random data source
#[derive(Debug, Clone)]
pub struct DataGenerator {
    rng: StdRng,
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGenerator {
    /// Generator seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible generator
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        debug!(seed, "seeded data generator");
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `prefix` + `length` chars drawn from `charset` + `suffix`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty charset when `length > 0`.
    pub fn random_string(
        &mut self,
        length: usize,
        charset: &str,
        prefix: &str,
        suffix: &str,
    ) -> AutomationResult<String> {
        let chars: Vec<char> = charset.chars().collect();
        if chars.is_empty() && length > 0 {
            return Err(AutomationError::invalid_argument("charset must not be empty"));
        }
        let mut out = String::with_capacity(prefix.len() + length + suffix.len());
        out.push_str(prefix);
        for _ in 0..length {
            out.push(chars[self.rng.gen_range(0..chars.len())]);
        }
        out.push_str(suffix);
        Ok(out)
    }

    fn draw(&mut self, length: usize, charset: &str) -> String {
        self.random_string(length, charset, "", "").unwrap_or_default()
    }

    /// Eight lowercase alphanumerics at `domain`, or at one of a few test
    /// domains
    pub fn random_email(&mut self, domain: Option<&str>) -> String {
        let user = self.draw(8, LOWER_ALPHANUMERIC);
        let domain = match domain {
            Some(d) => d,
            None => EMAIL_DOMAINS.choose(&mut self.rng).copied().unwrap_or("example.com"),
        };
        format!("{user}@{domain}")
    }

    /// Mobile number for `region`; only `CN` is known
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for any other region.
    pub fn random_phone(&mut self, region: &str) -> AutomationResult<String> {
        if region != "CN" {
            return Err(AutomationError::invalid_argument(format!(
                "unsupported phone region: {region}"
            )));
        }
        let prefix = CN_MOBILE_PREFIXES.choose(&mut self.rng).copied().unwrap_or("130");
        Ok(format!("{prefix}{}", self.draw(8, DIGITS)))
    }

    /// Person name; Chinese for `CN`, English otherwise
    pub fn random_name(&mut self, region: &str) -> String {
        if region == "CN" {
            let surname = CN_SURNAMES.choose(&mut self.rng).copied().unwrap_or("李");
            let len = self.rng.gen_range(1..=2);
            let given: String = (0..len)
                .filter_map(|_| CN_GIVEN.choose(&mut self.rng).copied())
                .collect();
            format!("{surname}{given}")
        } else {
            let first = EN_FIRST.choose(&mut self.rng).copied().unwrap_or("James");
            let last = EN_LAST.choose(&mut self.rng).copied().unwrap_or("Smith");
            format!("{first} {last}")
        }
    }

    /// Uniform integer in `min..=max`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `min > max`.
    pub fn random_int(&mut self, min: i64, max: i64) -> AutomationResult<i64> {
        if min > max {
            return Err(AutomationError::invalid_argument(format!(
                "empty range {min}..={max}"
            )));
        }
        Ok(self.rng.gen_range(min..=max))
    }

    /// Float in `[min, max)` rounded to `precision` decimals
    pub fn random_float(&mut self, min: f64, max: f64, precision: u32) -> f64 {
        let value = self.rng.gen::<f64>().mul_add(max - min, min);
        let scale = 10f64.powi(precision as i32);
        (value * scale).round() / scale
    }

    /// `true` with probability `p`
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    /// One element of `items`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty slice.
    pub fn random_element<'a, T>(&mut self, items: &'a [T]) -> AutomationResult<&'a T> {
        items
            .choose(&mut self.rng)
            .ok_or_else(|| AutomationError::invalid_argument("cannot choose from an empty list"))
    }

    /// `count` distinct elements of `items`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty slice or `count > items.len()`.
    pub fn random_elements<'a, T>(
        &mut self,
        items: &'a [T],
        count: usize,
    ) -> AutomationResult<Vec<&'a T>> {
        if items.is_empty() {
            return Err(AutomationError::invalid_argument("cannot choose from an empty list"));
        }
        if count > items.len() {
            return Err(AutomationError::invalid_argument(format!(
                "requested {count} elements from a list of {}",
                items.len()
            )));
        }
        Ok(items.choose_multiple(&mut self.rng, count).collect())
    }

    /// Version 4 UUID drawn from this generator
    pub fn random_uuid(&mut self) -> String {
        uuid::Builder::from_random_bytes(self.rng.gen())
            .into_uuid()
            .to_string()
    }

    /// Random address. IPv4 avoids `.0` network and `.255` broadcast hosts.
    pub fn random_ip(&mut self, version: IpVersion) -> String {
        match version {
            IpVersion::V4 => format!(
                "{}.{}.{}.{}",
                self.rng.gen_range(1..=255),
                self.rng.gen_range(0..=255),
                self.rng.gen_range(0..=255),
                self.rng.gen_range(1..=254)
            ),
            IpVersion::V6 => (0..8)
                .map(|_| format!("{:x}", self.rng.gen::<u16>()))
                .collect::<Vec<_>>()
                .join(":"),
        }
    }

    /// Date between `start` and `end`, formatted with `format`
    pub fn random_date(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        format: &str,
    ) -> String {
        let span = (end - start).num_seconds().max(0);
        let offset = self.rng.gen_range(0..=span);
        (start + ChronoDuration::seconds(offset))
            .format(format)
            .to_string()
    }

    /// Desktop browser User-Agent
    pub fn random_user_agent(&mut self) -> String {
        const PLATFORMS: [&str; 3] = [
            "Windows NT 10.0; Win64; x64",
            "Macintosh; Intel Mac OS X 10_15_7",
            "X11; Linux x86_64",
        ];
        let platform = PLATFORMS.choose(&mut self.rng).copied().unwrap_or(PLATFORMS[0]);
        let browser = match self.rng.gen_range(0..3) {
            0 => format!("Chrome/{}.0.0.0", self.rng.gen_range(90..=110)),
            1 => format!("Firefox/{}.0", self.rng.gen_range(90..=109)),
            _ => format!("Safari/{}.1.15", self.rng.gen_range(600..=605)),
        };
        format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) {browser} Safari/537.36"
        )
    }

    // ------------------------------------------------------------------
    // Payment fields
    // ------------------------------------------------------------------

    /// 32 random alphanumerics
    pub fn nonce_str(&mut self) -> String {
        self.draw(32, ALPHANUMERIC)
    }

    /// `T` + local timestamp + 6 random digits
    pub fn out_trade_no(&mut self) -> String {
        self.out_trade_no_at(&Local::now())
    }

    /// `T` + `now` + 6 random digits
    pub fn out_trade_no_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "T{}{}",
            now.format(COMPACT_TIME_FORMAT),
            self.draw(6, DIGITS)
        )
    }
}

/// `now` plus thirty minutes as `YYYYmmddHHMMSS`
#[must_use]
pub fn trade_expire_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    (now.clone() + ChronoDuration::minutes(TRADE_EXPIRY_MINUTES))
        .format(COMPACT_TIME_FORMAT)
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn noon() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 45, 10)
            .unwrap()
            .and_utc()
    }

    mod generator_tests {
        use super::*;

        #[test]
        fn test_seeded_is_reproducible() {
            let mut a = DataGenerator::seeded(7);
            let mut b = DataGenerator::seeded(7);
            assert_eq!(a.nonce_str(), b.nonce_str());
            assert_eq!(a.random_uuid(), b.random_uuid());
            assert_eq!(a.random_email(None), b.random_email(None));
        }

        #[test]
        fn test_random_string_shape() {
            let mut data = DataGenerator::seeded(1);
            let s = data.random_string(5, "ab", "pre-", "-suf").unwrap();
            assert!(s.starts_with("pre-") && s.ends_with("-suf"));
            assert_eq!(s.len(), 13);
            assert!(s[4..9].chars().all(|c| c == 'a' || c == 'b'));
            assert_eq!(data.random_string(0, "", "x", "").unwrap(), "x");
            assert!(data.random_string(3, "", "", "").is_err());
        }

        #[test]
        fn test_email_and_phone() {
            let mut data = DataGenerator::seeded(2);
            let email = data.random_email(Some("corp.test"));
            let (user, domain) = email.split_once('@').unwrap();
            assert_eq!(user.len(), 8);
            assert_eq!(domain, "corp.test");

            let phone = data.random_phone("CN").unwrap();
            assert_eq!(phone.len(), 11);
            assert!(phone.starts_with('1'));
            assert!(phone.chars().all(|c| c.is_ascii_digit()));

            assert!(data.random_phone("US").unwrap_err().is_invalid_argument());
        }

        #[test]
        fn test_numeric_helpers() {
            let mut data = DataGenerator::seeded(3);
            for _ in 0..50 {
                let n = data.random_int(-2, 2).unwrap();
                assert!((-2..=2).contains(&n));
                let f = data.random_float(1.0, 2.0, 2);
                assert!((1.0..=2.0).contains(&f));
                assert_eq!((f * 100.0).round() / 100.0, f);
            }
            assert!(data.random_int(5, 1).is_err());
            assert!(!data.random_bool(0.0));
            assert!(data.random_bool(1.0));
        }

        #[test]
        fn test_element_selection() {
            let mut data = DataGenerator::seeded(4);
            let items = ["a", "b", "c"];
            assert!(items.contains(data.random_element(&items).unwrap()));
            let picked = data.random_elements(&items, 3).unwrap();
            let mut sorted: Vec<_> = picked.into_iter().copied().collect();
            sorted.sort_unstable();
            assert_eq!(sorted, vec!["a", "b", "c"]);
            assert!(data.random_elements(&items, 4).is_err());
            assert!(data.random_element::<u8>(&[]).is_err());
        }

        #[test]
        fn test_uuid_and_ip() {
            let mut data = DataGenerator::seeded(5);
            let id = uuid::Uuid::parse_str(&data.random_uuid()).unwrap();
            assert_eq!(id.get_version_num(), 4);

            let v4: std::net::Ipv4Addr = data.random_ip(IpVersion::V4).parse().unwrap();
            assert_ne!(v4.octets()[0], 0);
            let v6: std::net::Ipv6Addr = data.random_ip(IpVersion::V6).parse().unwrap();
            assert_eq!(v6.segments().len(), 8);
        }

        #[test]
        fn test_names_and_dates() {
            let mut data = DataGenerator::seeded(6);
            let cn = data.random_name("CN");
            assert!((2..=3).contains(&cn.chars().count()));
            assert!(data.random_name("US").contains(' '));

            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let date = data.random_date(start, end, "%Y-%m-%d");
            assert!(date.starts_with("2024-01-"));
            assert!(data.random_user_agent().starts_with("Mozilla/5.0 ("));
        }
    }

    mod payment_field_tests {
        use super::*;

        #[test]
        fn test_nonce_str() {
            let nonce = DataGenerator::seeded(8).nonce_str();
            assert_eq!(nonce.len(), 32);
            assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        #[test]
        fn test_out_trade_no() {
            let no = DataGenerator::seeded(9).out_trade_no_at(&noon());
            assert_eq!(no.len(), 21);
            assert!(no.starts_with("T20241231234510"));
            assert!(no[15..].chars().all(|c| c.is_ascii_digit()));
        }

        #[test]
        fn test_trade_expire_time_rolls_over() {
            assert_eq!(trade_expire_time(&noon()), "20250101001510");
        }
    }
}
