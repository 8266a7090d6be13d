//! Unit-aware parsing of free-text vehicle attributes
//!
//! Every function returns `None` instead of failing, so one unparseable
//! attribute never affects the rest of a record.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{OwnerRatings, RatingCategory};

const MIN_VEHICLE_YEAR: i32 = 1980;
const MAX_MILEAGE_KM: u64 = 3_000_000;
const MIN_ENGINE_LITRES: f64 = 0.8;
const MAX_ENGINE_LITRES: f64 = 8.0;

static YEAR_WITH_UNIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})\s*(?:г\.?|год)").expect("static regex is valid"));
static YEAR_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("static regex is valid"));

static MILEAGE_THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,4})\s*(?:тыс(?:яч)?\.?|k)\s*(?:км)?").expect("static regex is valid"));
static MILEAGE_KM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,3}(?:\s\d{3})+|\d+)\s*км").expect("static regex is valid"));
static MILEAGE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)пробег[:\s]*(\d{1,3}(?:\s\d{3})+|\d+)").expect("static regex is valid"));

static ENGINE_LITRES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}(?:[.,]\d{1,2})?)\s*(?:л\b|л\.|литр)").expect("static regex is valid"));
static ENGINE_CC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{3,4})\s*(?:см³|см3|куб)").expect("static regex is valid"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*$").expect("static regex is valid"));

static DATE_ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("static regex is valid"));
static DATE_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("static regex is valid"));
static DATE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})\s+([а-яё]+)\s+(\d{4})").expect("static regex is valid"));
static DAYS_AGO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(?:дн|день)").expect("static regex is valid"));
static RATING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("static regex is valid"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d\s\u{a0}]*").expect("static regex is valid"));

const MONTHS: [&str; 12] = [
    "январ", "феврал", "март", "апрел", "ма", "июн", "июл", "август", "сентябр", "октябр", "ноябр", "декабр",
];

fn current_year() -> i32 {
    Utc::now().year()
}

fn valid_year(year: i32) -> Option<i32> {
    (MIN_VEHICLE_YEAR..=current_year()).contains(&year).then_some(year)
}

/// Model year, preferring an explicit "2015 г." over any bare four digits
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR_WITH_UNIT
        .captures_iter(text)
        .chain(YEAR_BARE.captures_iter(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
        .find_map(valid_year)
}

fn parse_grouped_number(raw: &str) -> Option<u64> {
    raw.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse::<u64>()
        .ok()
}

/// Mileage in kilometres. Small bare values are read as thousands.
pub fn parse_mileage_km(text: &str) -> Option<u32> {
    let from_thousands = MILEAGE_THOUSANDS
        .captures(text)
        .and_then(|caps| parse_grouped_number(caps.get(1)?.as_str()))
        .map(|value| value * 1000);

    let mileage = from_thousands.or_else(|| {
        MILEAGE_KM
            .captures(text)
            .or_else(|| MILEAGE_LABEL.captures(text))
            .and_then(|caps| parse_grouped_number(caps.get(1)?.as_str()))
            .map(|value| if value < 1000 { value * 1000 } else { value })
    })?;

    (mileage <= MAX_MILEAGE_KM).then_some(mileage as u32)
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

fn litres_in_range(value: f64) -> Option<f64> {
    let litres = if value > 100.0 { value / 1000.0 } else { value };
    let rounded = (litres * 10.0).round() / 10.0;
    (MIN_ENGINE_LITRES..=MAX_ENGINE_LITRES).contains(&rounded).then_some(rounded)
}

/// Engine volume in litres, from "1.6 л", "1,6 литра" or "1598 см³"
pub fn parse_engine_volume(text: &str) -> Option<f64> {
    ENGINE_LITRES
        .captures_iter(text)
        .chain(ENGINE_CC.captures_iter(text))
        .chain(DECIMAL.captures_iter(text))
        .filter_map(|caps| parse_decimal(caps.get(1)?.as_str()))
        .find_map(litres_in_range)
}

pub fn parse_fuel_type(text: &str) -> Option<String> {
    let low = text.to_lowercase();
    let fuel = if low.contains("бензин") {
        "бензин"
    } else if low.contains("дизел") {
        "дизель"
    } else if low.contains("гибрид") {
        "гибрид"
    } else if low.contains("электр") {
        "электро"
    } else if low.contains("газ") {
        "газ"
    } else {
        return None;
    };
    Some(fuel.to_string())
}

pub fn parse_transmission(text: &str) -> Option<String> {
    let low = text.to_lowercase();
    let transmission = if low.contains("вариатор") || low.contains("cvt") {
        "вариатор"
    } else if low.contains("робот") {
        "робот"
    } else if low.contains("автомат") || low.contains("акпп") {
        "автомат"
    } else if low.contains("механ") || low.contains("мкпп") {
        "механика"
    } else {
        return None;
    };
    Some(transmission.to_string())
}

pub fn parse_drive_type(text: &str) -> Option<String> {
    let low = text.to_lowercase();
    let drive = if low.contains("полный") || low.contains("4wd") || low.contains("awd") {
        "полный"
    } else if low.contains("передн") || low.contains("fwd") {
        "передний"
    } else if low.contains("задн") || low.contains("rwd") {
        "задний"
    } else {
        return None;
    };
    Some(drive.to_string())
}

fn month_number(word: &str) -> Option<u32> {
    let word = word.to_lowercase();
    // "мая"/"май" must not be confused with "март"
    if word.starts_with("мар") {
        return Some(3);
    }
    MONTHS
        .iter()
        .position(|stem| word.starts_with(stem))
        .map(|index| index as u32 + 1)
}

/// Posting date relative to `today` for "сегодня", "вчера", "N дней назад"
pub fn parse_date_relative(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let low = text.to_lowercase();

    if low.contains("сегодня") {
        return Some(today);
    }
    if low.contains("вчера") {
        return today.pred_opt();
    }
    if low.contains("назад") {
        let days = DAYS_AGO.captures(&low)?.get(1)?.as_str().parse::<i64>().ok()?;
        return today.checked_sub_signed(ChronoDuration::days(days));
    }

    if let Some(caps) = DATE_ISO.captures(text) {
        let (y, m, d) = (caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    if let Some(caps) = DATE_DOTTED.captures(text) {
        let (d, m, y) = (caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    if let Some(caps) = DATE_WORDS.captures(text) {
        let day = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_date_relative(text, Utc::now().date_naive())
}

/// First decimal number in the text, e.g. "4.6 из 5" → 4.6
pub fn parse_rating(text: &str) -> Option<f64> {
    RATING
        .captures(text)
        .and_then(|caps| parse_decimal(caps.get(1)?.as_str()))
        .filter(|rating| (0.0..=10.0).contains(rating))
}

pub fn parse_rating_category(label: &str) -> Option<RatingCategory> {
    let low = label.to_lowercase();
    let category = if low.contains("внешний вид") || low.contains("внешность") {
        RatingCategory::Exterior
    } else if low.contains("салон") || low.contains("комфорт") {
        RatingCategory::Interior
    } else if low.contains("двигател") {
        RatingCategory::Engine
    } else if low.contains("ходов") || low.contains("управляем") {
        RatingCategory::Driving
    } else {
        return None;
    };
    Some(category)
}

/// One owner score row such as "Ходовые качества 4". Only whole scores
/// on the 1 to 5 scale are accepted.
pub fn parse_owner_rating(text: &str) -> Option<(RatingCategory, u8)> {
    let category = parse_rating_category(text)?;
    let score = parse_rating(text)?;
    if score.fract() != 0.0 || !(1.0..=f64::from(OwnerRatings::MAX_SCORE)).contains(&score) {
        return None;
    }
    Some((category, score as u8))
}

/// Integer made of digits separated by spaces, e.g. "12 554" → 12554
pub fn parse_count(text: &str) -> Option<u64> {
    DIGITS.find(text).and_then(|m| parse_grouped_number(m.as_str()))
}

/// Last integer in the text, for labels that start with a number ("5 копеек 87")
pub fn parse_trailing_count(text: &str) -> Option<u64> {
    DIGITS.find_iter(text).last().and_then(|m| parse_grouped_number(m.as_str()))
}
