#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileType {
    WAL(u64),
    Lock,
    Table(u64),
    // tables written by older releases used the `.sst` suffix
    LegacyTable(u64),
    Current,
    Manifest(u64),
}

pub fn db_filename(dirname: &str, file_type: FileType) -> String {
    let dirname = dirname.strip_suffix('/').unwrap_or(dirname);
    let file_name = match file_type {
        FileType::Table(num) => format!("{n:>0w$}.ldb", n = num, w = 6),
        FileType::LegacyTable(num) => format!("{n:>0w$}.sst", n = num, w = 6),
        FileType::WAL(num) => format!("{n:>0w$}.log", n = num, w = 6),
        FileType::Manifest(num) => format!("MANIFEST-{n:>0w$}", n = num, w = 6),
        FileType::Current => "CURRENT".to_string(),
        FileType::Lock => "LOCK".to_string(),
    };
    format!("{}/{}", dirname, file_name)
}

pub fn table_file_name(dirname: &str, num: u64) -> String {
    db_filename(dirname, FileType::Table(num))
}

pub fn legacy_table_file_name(dirname: &str, num: u64) -> String {
    db_filename(dirname, FileType::LegacyTable(num))
}

pub fn parse_dbname(fullname: &str) -> Option<FileType> {
    let filename = fullname.rsplit('/').next().unwrap_or(fullname);
    match filename {
        "LOCK" => Some(FileType::Lock),
        "CURRENT" => Some(FileType::Current),
        other => {
            if let Some(n) = other.strip_prefix("MANIFEST-") {
                return n.parse::<u64>().ok().map(FileType::Manifest);
            }
            let (num, suffix) = other.split_once('.')?;
            let num = num.parse::<u64>().ok()?;
            match suffix {
                "ldb" => Some(FileType::Table(num)),
                "sst" => Some(FileType::LegacyTable(num)),
                "log" => Some(FileType::WAL(num)),
                _ => None,
            }
        }
    }
}
