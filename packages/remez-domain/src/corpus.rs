use crate::prefilter::CanonicalPassage;

/// A small built-in slice of well-known canonical passages. Deployments index
/// the full corpus through the vector store; this fixed set is what the
/// zero-cost lexical pre-filter matches against.
pub fn builtin_passages() -> Vec<CanonicalPassage> {
	[
		("Berakhot 2a", "מאימתי קורין את שמע בערבית משעה שהכהנים נכנסים לאכול בתרומתן"),
		("Berakhot 55a", "חלום שלא נפתר כאגרת שלא נקראה"),
		("Shabbat 31a", "דעלך סני לחברך לא תעביד זו היא כל התורה כולה ואידך פירושה הוא זיל גמור"),
		("Shabbat 127a", "אלו דברים שאדם אוכל פירותיהן בעולם הזה והקרן קיימת לו לעולם הבא"),
		("Eruvin 13b", "אלו ואלו דברי אלהים חיים הן"),
		("Pesachim 116b", "בכל דור ודור חייב אדם לראות את עצמו כאילו הוא יצא ממצרים"),
		("Taanit 7a", "ומתלמידי יותר מכולן"),
		("Sotah 14a", "מה הוא רחום אף אתה היה רחום"),
		("Kiddushin 40b", "תלמוד גדול שהתלמוד מביא לידי מעשה"),
		("Bava Metzia 59b", "לא בשמים היא"),
		("Sanhedrin 37a", "כל המקיים נפש אחת מישראל מעלה עליו הכתוב כאילו קיים עולם מלא"),
		("Avot 1:1", "משה קבל תורה מסיני ומסרה ליהושע ויהושע לזקנים וזקנים לנביאים"),
		("Avot 1:2", "על שלשה דברים העולם עומד על התורה ועל העבודה ועל גמילות חסדים"),
		("Avot 1:14", "אם אין אני לי מי לי וכשאני לעצמי מה אני ואם לא עכשיו אימתי"),
		("Avot 2:16", "לא עליך המלאכה לגמור ולא אתה בן חורין ליבטל ממנה"),
	]
	.into_iter()
	.map(|(source, text)| CanonicalPassage {
		source: source.to_string(),
		text: text.to_string(),
	})
	.collect()
}
