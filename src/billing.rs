// 検針日を起点とした日付計算
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Asia;

/// 日本標準時の現在時刻
pub fn jst_now() -> NaiveDateTime {
    Utc::now().with_timezone(&Asia::Tokyo).naive_local()
}

/// 日本標準時の今日
pub fn jst_today() -> NaiveDate {
    jst_now().date()
}

// 月の長さを超える検針日は月末日に丸める
fn ymd_clamped(year: i32, month: u32, day: u32) -> NaiveDate {
    let last_day = match month {
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    };
    // 1..=月末日に収めているので失敗しない
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last_day)).unwrap()
}

/// 前回検針日
///
/// 検針日をまだ迎えていない月は前月、1月は前年12月とする。
pub fn last_collection_date(collect_day: u8, today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else if today.day() < collect_day as u32 {
        (today.year(), today.month() - 1)
    } else {
        (today.year(), today.month())
    };
    ymd_clamped(year, month, collect_day as u32)
}

/// 前回検針日からの経過日数
pub fn days_since_last_collection(collect_day: u8, today: NaiveDate) -> i64 {
    (today - last_collection_date(collect_day, today)).num_days()
}

#[test]
fn test_mid_year() {
    // 検針日22日、今日が2024-03-10なら前回検針日は2024-02-22
    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    assert_eq!(
        last_collection_date(22, today),
        NaiveDate::from_ymd_opt(2024, 2, 22).unwrap()
    );
    assert_eq!(days_since_last_collection(22, today), 17);

    // 検針日を過ぎていれば当月
    let today = NaiveDate::from_ymd_opt(2024, 3, 22).unwrap();
    assert_eq!(
        last_collection_date(10, today),
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    );
    assert_eq!(days_since_last_collection(10, today), 12);

    // 検針日当日は経過0日
    assert_eq!(days_since_last_collection(22, today), 0);
}

#[test]
fn test_january_reaches_back_to_december() {
    // 1月は前年12月にさかのぼる
    let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    assert_eq!(
        last_collection_date(22, today),
        NaiveDate::from_ymd_opt(2023, 12, 22).unwrap()
    );
    // 31 - 22 + 15
    assert_eq!(days_since_last_collection(22, today), 24);
}

#[test]
fn test_collect_day_clamped_to_month_end() {
    // 2月に31日はないので月末日へ丸める
    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    assert_eq!(
        last_collection_date(31, today),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    let today = NaiveDate::from_ymd_opt(2023, 3, 10).unwrap();
    assert_eq!(
        last_collection_date(31, today),
        NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
    );
}
