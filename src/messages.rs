//! Reminder message catalog
//!
//! Messages are grouped by tone. Walking reminders are always cautionary;
//! lying reminders switch to a sleep-oriented tone inside the bedtime window.

use crate::types::ReminderKind;
use serde::{Deserialize, Serialize};

/// Message tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Safety reminder while walking
    Caution,
    /// Lying down during the bedtime window
    Bedtime,
    /// Lying down outside the bedtime window
    Rest,
}

impl Tone {
    /// Tone for a reminder kind given whether it is currently bedtime
    pub fn for_kind(kind: ReminderKind, bedtime: bool) -> Self {
        match (kind, bedtime) {
            (ReminderKind::Walking, _) => Tone::Caution,
            (ReminderKind::Lying, true) => Tone::Bedtime,
            (ReminderKind::Lying, false) => Tone::Rest,
        }
    }
}

const CAUTION_MESSAGES: &[&str] = &[
    "🚶‍♀️ 지금은 걸을 때가 아니라 쉴 때에요! 안전을 위해 잠시 폰을 내려놓고 주변을 확인해주세요. 당신의 안전이 가장 소중해요! 💙",
    "⚠️ 보행 중 스마트폰 사용이 감지되었어요. 주변 상황에 주의하시고, 안전한 곳에서 확인해주세요!",
    "안전을 위해 스마트폰 사용을 자제해주세요. 주변을 확인하고 걸어주세요.",
];

const BEDTIME_MESSAGES: &[&str] = &[
    "🌙 눈과 몸도 함께 쉬어야 해요. 좋은 꿈을 위해 스마트폰을 내려놓고 편안한 휴식을 취해보세요. 내일 더 상쾌한 아침을 맞이할 수 있을 거예요! ✨",
    "좋은 수면을 위해 스마트폰을 내려놓고 휴식을 취해보세요.",
    "💤 잠들 시간이에요. 화면 불빛은 잠을 방해할 수 있어요. 오늘 하루도 수고했어요!",
];

const REST_MESSAGES: &[&str] = &[
    "🛏️ 누워서 오래 스마트폰을 보고 있어요. 잠시 일어나 스트레칭을 해보는 건 어때요?",
    "눈이 피곤할 수 있어요. 잠깐 화면에서 눈을 떼고 먼 곳을 바라봐 주세요. 👀",
    "편안한 자세도 좋지만, 목과 어깨를 위해 자세를 바꿔보세요! 😊",
];

/// Messages available for a tone
pub fn messages_for(tone: Tone) -> &'static [&'static str] {
    match tone {
        Tone::Caution => CAUTION_MESSAGES,
        Tone::Bedtime => BEDTIME_MESSAGES,
        Tone::Rest => REST_MESSAGES,
    }
}

/// Rotating message picker that never repeats the previous message of a kind
#[derive(Debug, Clone, Default)]
pub struct MessageSelector {
    /// Last message sent per kind
    last: [Option<&'static str>; 2],
    /// Next rotation index per tone
    cursor: [usize; 3],
}

impl MessageSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next message for a kind and tone
    pub fn select(&mut self, kind: ReminderKind, tone: Tone) -> &'static str {
        let messages = messages_for(tone);
        let slot = tone_slot(tone);
        let previous = self.last[kind.index()];

        let mut index = self.cursor[slot] % messages.len();
        if messages.len() > 1 && Some(messages[index]) == previous {
            index = (index + 1) % messages.len();
        }

        let message = messages[index];
        self.cursor[slot] = (index + 1) % messages.len();
        self.last[kind.index()] = Some(message);
        message
    }
}

fn tone_slot(tone: Tone) -> usize {
    match tone {
        Tone::Caution => 0,
        Tone::Bedtime => 1,
        Tone::Rest => 2,
    }
}
