use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// 客户允许送货的星期 (customers.delivery_calendar, JSON)
///
/// 未配置时为周一至周五; JSON 中缺失的某天视为不送货。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCalendar {
    #[serde(default)]
    pub monday: bool,
    #[serde(default)]
    pub tuesday: bool,
    #[serde(default)]
    pub wednesday: bool,
    #[serde(default)]
    pub thursday: bool,
    #[serde(default)]
    pub friday: bool,
    #[serde(default)]
    pub saturday: bool,
    #[serde(default)]
    pub sunday: bool,
}

impl Default for DeliveryCalendar {
    fn default() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
        }
    }
}

/// 导出时确定的发票日期与到期日
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceDates {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl DeliveryCalendar {
    pub fn allows(&self, day: Weekday) -> bool {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// 从 `from` 当天起最近的送货日; 一天都不允许时返回 `from`
    pub fn nearest_delivery_date(&self, from: NaiveDate) -> NaiveDate {
        (0..=7)
            .map(|ahead| from + Duration::days(ahead))
            .find(|date| self.allows(date.weekday()))
            .unwrap_or(from)
    }

    /// 发票日期 = 最近送货日; 到期日 = 发票月末 + 账期天数
    pub fn invoice_dates(&self, today: NaiveDate, payment_terms_days: i32) -> InvoiceDates {
        let invoice_date = self.nearest_delivery_date(today);
        let due_date = end_of_month(invoice_date) + Duration::days(i64::from(payment_terms_days));
        InvoiceDates {
            invoice_date,
            due_date,
        }
    }
}

pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}
