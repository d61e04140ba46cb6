// ==========================================
// 生产看板导入系统 - 源表布局定义
// ==========================================
// 职责: 每个导入种类的规范字段列表、表头别名、语义类型、必填/逻辑键标记
// 说明: 列位置不固定，一律按表头标签匹配，从不硬编码列下标
// ==========================================

use crate::domain::types::ImportKind;

// ===== 规范字段名 =====
pub const F_DATE: &str = "date";
pub const F_OPERATOR: &str = "operator";
pub const F_SHIFT: &str = "shift";
pub const F_PIECES_PER_MINUTE: &str = "pieces_per_minute";
pub const F_WORKED_MINUTES: &str = "worked_minutes";
pub const F_MACHINE: &str = "machine";
pub const F_PERIOD: &str = "period";
pub const F_PERFORMANCE_PCT: &str = "performance_pct";
pub const F_QUALITY_PCT: &str = "quality_pct";
pub const F_SCRAP_COUNT: &str = "scrap_count";
pub const F_POSITION: &str = "position";
pub const F_PLANNED: &str = "planned";

/// 字段语义类型（每种类型对应一个转换函数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Date,
    /// 月份，取当月第一天
    Month,
    Integer,
    Decimal,
    Text,
    /// 班次枚举
    Shift,
    /// 岗位枚举
    Position,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub ty: SemanticType,
    pub required: bool,
    /// 参与逻辑键（文本会去除首尾空白）
    pub key: bool,
}

/// 宽表日期列块: 表头单元格本身是日期，单元格值为 value_field
#[derive(Debug, Clone, Copy)]
pub struct DateColumnBlock {
    pub date_field: &'static str,
    pub value_field: &'static str,
    pub value_ty: SemanticType,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportLayout {
    pub kind: ImportKind,
    pub fields: &'static [FieldSpec],
    pub date_block: Option<DateColumnBlock>,
}

const NAPI_PERCES_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: F_DATE,
        aliases: &["Dátum"],
        ty: SemanticType::Date,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_OPERATOR,
        aliases: &["Operátor", "Dolgozó"],
        ty: SemanticType::Text,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_SHIFT,
        aliases: &["Műszak"],
        ty: SemanticType::Shift,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_PIECES_PER_MINUTE,
        aliases: &["Db/perc", "Darab/perc"],
        ty: SemanticType::Decimal,
        required: true,
        key: false,
    },
    FieldSpec {
        name: F_WORKED_MINUTES,
        aliases: &["Perc", "Ledolgozott perc"],
        ty: SemanticType::Integer,
        required: false,
        key: false,
    },
    FieldSpec {
        name: F_MACHINE,
        aliases: &["Gép", "Gépsor"],
        ty: SemanticType::Text,
        required: false,
        key: false,
    },
];

const TELJESITMENY_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: F_OPERATOR,
        aliases: &["Operátor", "Név"],
        ty: SemanticType::Text,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_PERIOD,
        aliases: &["Időszak", "Hónap"],
        ty: SemanticType::Month,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_PERFORMANCE_PCT,
        aliases: &["Teljesítmény %", "Teljesítmény"],
        ty: SemanticType::Decimal,
        required: true,
        key: false,
    },
    FieldSpec {
        name: F_QUALITY_PCT,
        aliases: &["Minőség %", "Minőség"],
        ty: SemanticType::Decimal,
        required: false,
        key: false,
    },
    FieldSpec {
        name: F_SCRAP_COUNT,
        aliases: &["Selejt", "Selejt db"],
        ty: SemanticType::Integer,
        required: false,
        key: false,
    },
];

const WARROOM_LETSZAM_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: F_SHIFT,
        aliases: &["Műszak"],
        ty: SemanticType::Shift,
        required: true,
        key: true,
    },
    FieldSpec {
        name: F_POSITION,
        aliases: &["Pozíció", "Munkakör"],
        ty: SemanticType::Position,
        required: true,
        key: true,
    },
];

static NAPI_PERCES: ImportLayout = ImportLayout {
    kind: ImportKind::NapiPerces,
    fields: NAPI_PERCES_FIELDS,
    date_block: None,
};

static TELJESITMENY: ImportLayout = ImportLayout {
    kind: ImportKind::Teljesitmeny,
    fields: TELJESITMENY_FIELDS,
    date_block: None,
};

static WARROOM_LETSZAM: ImportLayout = ImportLayout {
    kind: ImportKind::WarroomLetszam,
    fields: WARROOM_LETSZAM_FIELDS,
    date_block: Some(DateColumnBlock {
        date_field: F_DATE,
        value_field: F_PLANNED,
        value_ty: SemanticType::Integer,
    }),
};

impl ImportLayout {
    pub fn for_kind(kind: ImportKind) -> &'static ImportLayout {
        match kind {
            ImportKind::NapiPerces => &NAPI_PERCES,
            ImportKind::Teljesitmeny => &TELJESITMENY,
            ImportKind::WarroomLetszam => &WARROOM_LETSZAM,
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl FieldSpec {
    /// 表头标签是否匹配本字段的任一别名
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_label(label);
        self.aliases.iter().any(|alias| normalize_label(alias) == label)
    }
}

/// 表头标签归一化: 小写 + 连续空白折叠为单个空格 + 去首尾空白
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
