//! Localized text packs — pure data lookup, no formatting logic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported user-facing languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Ru,
    En,
    Th,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Ru, Language::En, Language::Th];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
            Language::Th => "th",
        }
    }

    /// Native-script label for the language chooser keyboard.
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::Ru => "Русский",
            Language::En => "English",
            Language::Th => "ไทย",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ru" => Ok(Language::Ru),
            "en" => Ok(Language::En),
            "th" => Ok(Language::Th),
            _ => Err(()),
        }
    }
}

/// Inline-keyboard button labels.
pub struct ButtonLabels {
    pub subscribe: &'static str,
    pub check_sub: &'static str,
    pub contact_manager: &'static str,
    pub change_lang: &'static str,
}

/// All user-facing texts for one language.
pub struct TextPack {
    pub choose_lang: &'static str,
    pub greeting: &'static str,
    pub checking_subscription: &'static str,
    pub subscribed_ok: &'static str,
    pub not_subscribed: &'static str,
    pub check_failed: &'static str,
    pub document_sent: &'static str,
    pub followup: &'static str,
    pub fallback_question: &'static str,
    pub buttons: ButtonLabels,
}

static RU: TextPack = TextPack {
    choose_lang: "Выберите язык / Select your language / เลือกภาษา",
    greeting: "Приветствуем в Rome Estate!\n\n\
        Мы приготовили для вас лучшие инвестиционные проекты на Пхукете.\n\
        Чтобы продолжить, подпишитесь на наш канал 👇",
    checking_subscription: "Благодарим за интерес 🙏\nСекунду, проверяем вашу подписку…",
    subscribed_ok: "Отлично! ✅ Вы в числе наших избранных подписчиков.\n\
        Напишите слово «Проект», и мы отправим вам подборку из 30 лучших \
        инвестиционных проектов на Пхукете, отобранных экспертами Rome Estate.",
    not_subscribed: "Похоже, вы ещё не подписаны 😔\n\
        Нажмите кнопку ниже, чтобы подписаться и продолжить.",
    check_failed: "Не удалось проверить подписку. Попробуйте ещё раз чуть позже.",
    document_sent: "📂 Ваша персональная подборка готова!\n\
        Это 30 тщательно проверенных инвестиционных объектов с высокой доходностью \
        и перспективой роста стоимости. Мы уверены, что среди них вы найдёте \
        подходящий вариант. ✨",
    followup: "Напоминаем о себе 👋\n\
        У нас для вас всегда открыты лучшие возможности на Пхукете.\n\
        Хотите, свяжем вас напрямую с нашим менеджером?",
    fallback_question: "Спасибо за ваш вопрос!\n\
        Чтобы получить быстрый ответ — свяжитесь с менеджером 👇",
    buttons: ButtonLabels {
        subscribe: "Подписаться на канал Rome Estate",
        check_sub: "Проверить подписку",
        contact_manager: "Связаться с менеджером",
        change_lang: "Сменить язык",
    },
};

static EN: TextPack = TextPack {
    choose_lang: "Select your language / Выберите язык / เลือกภาษา",
    greeting: "Welcome to Rome Estate!\n\n\
        We’ve prepared top investment projects in Phuket for you.\n\
        To continue, please subscribe to our channel 👇",
    checking_subscription: "Thanks for your interest 🙏\nChecking your subscription…",
    subscribed_ok: "Great! ✅ You’re among our selected subscribers.\n\
        Type the word ‘Project’ and we’ll send you a selection of the top 30 \
        investment projects in Phuket, curated by Rome Estate experts.",
    not_subscribed: "Looks like you haven’t subscribed yet 😔\n\
        Tap the button below to subscribe and continue.",
    check_failed: "We couldn’t verify your subscription. Please try again in a moment.",
    document_sent: "📂 Your personal selection is ready!\n\
        These are 30 carefully verified investment properties with strong ROI and \
        growth potential. We’re sure you’ll find the right option. ✨",
    followup: "A quick reminder 👋\n\
        We always have great opportunities in Phuket for you.\n\
        Would you like us to connect you directly with our manager?",
    fallback_question: "Thanks for your question!\n\
        For a quick reply — contact our manager 👇",
    buttons: ButtonLabels {
        subscribe: "Subscribe to Rome Estate channel",
        check_sub: "Check subscription",
        contact_manager: "Contact manager",
        change_lang: "Change language",
    },
};

static TH: TextPack = TextPack {
    choose_lang: "เลือกภาษา / Select your language / Выберите язык",
    greeting: "ยินดีต้อนรับสู่ Rome Estate!\n\n\
        เราได้เตรียมโครงการลงทุนที่ดีที่สุดในภูเก็ตไว้ให้คุณ\n\
        เพื่อดำเนินการต่อ กรุณาติดตามช่องของเรา 👇",
    checking_subscription: "ขอบคุณสำหรับความสนใจ 🙏\nกำลังตรวจสอบการติดตามของคุณ…",
    subscribed_ok: "ยอดเยี่ยม! ✅ คุณอยู่ในรายชื่อผู้ติดตามพิเศษของเรา\n\
        พิมพ์คำว่า ‘โปรเจกต์’ แล้วเราจะส่งลิสต์ 30 โครงการลงทุนชั้นนำในภูเก็ต\
        ที่ผู้เชี่ยวชาญของ Rome Estate คัดสรรให้",
    not_subscribed: "ดูเหมือนคุณยังไม่ได้ติดตามช่อง 😔\n\
        กดปุ่มด้านล่างเพื่อติดตามและดำเนินการต่อ",
    check_failed: "ไม่สามารถตรวจสอบการติดตามได้ กรุณาลองใหม่อีกครั้ง",
    document_sent: "📂 รายการส่วนตัวของคุณพร้อมแล้ว!\n\
        นี่คือ 30 อสังหาริมทรัพย์ที่ผ่านการตรวจสอบอย่างรอบคอบ \
        มีผลตอบแทนและศักยภาพการเติบโตสูง เรามั่นใจว่าคุณจะพบตัวเลือกที่เหมาะสม ✨",
    followup: "แจ้งเตือนสั้นๆ 👋\n\
        เรามีโอกาสการลงทุนที่ยอดเยี่ยมในภูเก็ตสำหรับคุณเสมอ\n\
        ต้องการให้เราติดต่อผู้จัดการให้โดยตรงหรือไม่?",
    fallback_question: "ขอบคุณสำหรับคำถาม!\n\
        หากต้องการคำตอบที่รวดเร็ว — ติดต่อผู้จัดการของเรา 👇",
    buttons: ButtonLabels {
        subscribe: "ติดตามช่อง Rome Estate",
        check_sub: "ตรวจสอบการติดตาม",
        contact_manager: "ติดต่อผู้จัดการ",
        change_lang: "เปลี่ยนภาษา",
    },
};

/// Text pack for a language.
pub fn pack(lang: Language) -> &'static TextPack {
    match lang {
        Language::Ru => &RU,
        Language::En => &EN,
        Language::Th => &TH,
    }
}
